use std::fmt;

/// Classification of compilation failures.
///
/// Kinds, not types: every failure in the core maps onto exactly one of
/// these, and the whole compilation fails on the first one raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptySet,
    MatrixParse,
    MatrixTooLarge,
    Substitution,
    PipelineParse,
    Lint,
    Filter,
    Compile,
    NoStartpoint,
    DuplicateWorkflowName,
    Cancelled,
    Config,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::EmptySet => "empty source set",
            ErrorKind::MatrixParse => "matrix parse error",
            ErrorKind::MatrixTooLarge => "matrix too large",
            ErrorKind::Substitution => "substitution error",
            ErrorKind::PipelineParse => "pipeline parse error",
            ErrorKind::Lint => "lint error",
            ErrorKind::Filter => "filter error",
            ErrorKind::Compile => "compile error",
            ErrorKind::NoStartpoint => "no startpoint",
            ErrorKind::DuplicateWorkflowName => "duplicate workflow name",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "configuration error",
            ErrorKind::Io => "io error",
        };
        f.write_str(name)
    }
}

/// Error raised by the pipeline compilation core.
///
/// Carries the offending file name and, where a rule can point at one,
/// a location inside it (a step name, a matrix axis). The core never
/// repairs input; the first error aborts the compilation.
#[derive(Debug)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<String>,
    pub location: Option<String>,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl CompileError {
    pub fn new<T: Into<String>>(kind: ErrorKind, message: T) -> Self {
        CompileError {
            kind,
            message: message.into(),
            file: None,
            location: None,
            source: None,
        }
    }

    pub fn with_file<T: Into<String>>(mut self, file: T) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_location<T: Into<String>>(mut self, location: T) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_source(
        mut self,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(ref file) = self.file {
            write!(f, " (file: {})", file)?;
        }
        if let Some(ref location) = self.location {
            write!(f, " (at: {})", location)?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\ncaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for CompileError {
    fn from(err: std::io::Error) -> Self {
        CompileError::new(ErrorKind::Io, err.to_string()).with_source(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_file_and_location() {
        let err = CompileError::new(ErrorKind::Lint, "step has no image")
            .with_file("deploy.yaml")
            .with_location("steps.publish");
        let text = err.to_string();
        assert!(text.contains("lint error"));
        assert!(text.contains("deploy.yaml"));
        assert!(text.contains("steps.publish"));
    }

    #[test]
    fn source_chain_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = CompileError::from(io);
        assert_eq!(err.kind, ErrorKind::Io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
