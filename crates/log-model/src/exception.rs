use serde::{Deserialize, Serialize};

/// A captured exception, recursively describing its cause chain. Built from
/// a host-language captured exception tree, which by construction cannot
/// contain cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionData {
    pub message: String,
    pub type_name: String,
    pub stack_text: String,
    pub inner: Option<Box<ExceptionData>>,
    pub aggregated_inner: Option<Vec<ExceptionData>>,
    pub loader_exceptions: Option<Vec<ExceptionData>>,
    pub fusion_log: Option<String>,
}

impl ExceptionData {
    pub fn new(message: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            type_name: type_name.into(),
            stack_text: String::new(),
            inner: None,
            aggregated_inner: None,
            loader_exceptions: None,
            fusion_log: None,
        }
    }

    pub fn with_inner(mut self, inner: ExceptionData) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_inner_is_preserved() {
        let outer = ExceptionData::new("outer failed", "OuterError")
            .with_inner(ExceptionData::new("root cause", "InnerError"));
        assert_eq!(outer.inner.as_ref().unwrap().message, "root cause");
    }
}
