/// Receives human-readable progress text for an in-flight download. Owned by
/// the caller; implementations decide how the text is rendered.
pub trait ProgressSink: Send + Sync {
    /// Replaces the short status line of the current operation.
    fn change_substatus(&self, text: &str);

    /// Emits a standalone line, e.g. backend output or an error.
    fn print(&self, text: &str);
}

/// Wraps text in the bold markup understood by the surrounding UI.
pub fn bold(text: &str) -> String {
    format!("<b>{text}</b>")
}
