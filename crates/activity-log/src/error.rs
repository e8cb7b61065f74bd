/// Failures surfaced by the facade's ambient default-dispatcher lookup.
#[derive(Debug, thiserror::Error)]
pub enum ActivityLogError {
    /// The default dispatcher was disposed and nothing has called
    /// [`crate::ensure_active_default`] since.
    #[error("the default dispatcher has been disposed; call ensure_active_default to reinitialize")]
    Disposed,
}
