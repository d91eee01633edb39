//! Boundary scene model: the storyboard document and caption track.

/// Caption words and transcript payload parsing.
pub mod captions;
/// Storyboard document, validation, and path rules.
pub mod storyboard;
