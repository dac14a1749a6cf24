//! Error taxonomy for the viewer core

/// Fault reported by the external rasterization engine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct BackendFault {
    pub detail: String,
}

impl BackendFault {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { detail: msg.into() }
    }
}

/// Errors surfaced by the document handle and the render pipeline
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewerError {
    /// The source could not be opened. Fatal to the viewer session.
    #[error("failed to open {location}: {reason}")]
    Open { location: String, reason: String },

    /// Page index outside `[0, page_count)`. Indicates a pagination bug.
    #[error("page index {index} out of range (page count {page_count})")]
    PageIndex { index: usize, page_count: usize },

    /// Malformed page data. Recoverable: the page stays blank.
    #[error("failed to decode page {index}: {fault}")]
    Decode { index: usize, fault: BackendFault },

    /// Rasterization failed for a decoded page.
    #[error("failed to render page {index}: {fault}")]
    Render { index: usize, fault: BackendFault },

    /// Page operation attempted after the document was closed.
    #[error("document is closed")]
    Closed,
}

impl ViewerError {
    pub fn open(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Open {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Whether the session can keep going after this error
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::Render { .. })
    }
}

pub type ViewerResult<T> = Result<T, ViewerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_and_render_are_recoverable() {
        let fault = BackendFault::new("bad xref");
        assert!(
            ViewerError::Decode {
                index: 1,
                fault: fault.clone()
            }
            .is_recoverable()
        );
        assert!(ViewerError::Render { index: 1, fault }.is_recoverable());
        assert!(!ViewerError::open("a.pdf", "missing").is_recoverable());
        assert!(!ViewerError::Closed.is_recoverable());
    }

    #[test]
    fn messages_name_the_page() {
        let err = ViewerError::PageIndex {
            index: 7,
            page_count: 3,
        };
        assert_eq!(err.to_string(), "page index 7 out of range (page count 3)");
    }
}
