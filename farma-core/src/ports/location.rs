//! Navigation port - the visible location of the app

/// Access to the current navigation state
///
/// On the web this is `window.location`; in the CLI it is the reset link
/// the user pasted.
pub trait Location: Send + Sync {
    /// Text after `#`, without the `#`
    fn fragment(&self) -> Option<String>;

    /// Remove the fragment from the visible location so tokens cannot be
    /// replayed from history
    fn clear_fragment(&self);

    fn navigate(&self, path: &str);
}
