//! Error types for ragserve.

use thiserror::Error;

/// Main error type for ragserve operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Text extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Language-model call failed
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    /// Vector index operation failed
    #[error("vector store error: {0}")]
    Store(#[from] VectorStoreError),

    /// Configuration handling failed
    #[error("configuration error: {0}")]
    Config(#[from] ConfigurationError),

    /// Document processing failed
    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// Registry operation failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Text extraction errors.
///
/// Extraction failures are recovered locally where possible: a failed native
/// extraction falls back to OCR, and a failed OCR pass reverts to whatever
/// text the native pass produced.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("ocr failed: {0}")]
    Ocr(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Embedding provider errors.
///
/// Upstream API failures are surfaced with the backend's diagnostic and are
/// not retried automatically.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding api error: {0}")]
    Api(String),

    #[error("embedding request timed out: {0}")]
    Timeout(String),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Language-model provider errors.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("llm api error: {0}")]
    Api(String),

    #[error("llm request timed out: {0}")]
    Timeout(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("invalid llm response: {0}")]
    InvalidResponse(String),
}

/// Vector index errors.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("index initialization failed: {0}")]
    Init(String),

    #[error("insert failed: {0}")]
    Insert(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("persistence failed: {0}")]
    Persist(String),

    #[error("vector length {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// A provider failed its connection test during create/update/activate.
    #[error("provider validation failed: {0}")]
    Validation(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The requested backend was not compiled into this build.
    #[error("backend not available in this build: {0}")]
    MissingBackend(String),

    #[error("configuration not found: {0}")]
    NotFound(String),

    #[error("no active configuration")]
    NoActiveConfiguration,

    #[error("configuration persistence failed: {0}")]
    Persist(String),
}

/// Document registry errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("registry storage error: {0}")]
    Storage(String),
}

/// Document processing errors.
///
/// Generic wrapper for any component failure caught at the document-processor
/// boundary; the underlying message is recorded on the document record.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store failed: {0}")]
    Store(#[from] VectorStoreError),

    #[error("registry failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("processing failed: {0}")]
    Failed(String),
}

/// Result type alias for ragserve operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // ========== ExtractionError Tests ==========

    #[test]
    fn test_extraction_error_unsupported_display() {
        let err = ExtractionError::UnsupportedFormat("xlsx".to_string());
        assert_eq!(err.to_string(), "unsupported format: xlsx");
    }

    #[test]
    fn test_extraction_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ExtractionError = io_err.into();
        assert!(matches!(err, ExtractionError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_extraction_error_ocr_display() {
        let err = ExtractionError::Ocr("tesseract exited with status 1".to_string());
        assert_eq!(err.to_string(), "ocr failed: tesseract exited with status 1");
    }

    // ========== EmbeddingError Tests ==========

    #[test]
    fn test_embedding_error_api_display() {
        let err = EmbeddingError::Api("401 invalid api key".to_string());
        assert_eq!(err.to_string(), "embedding api error: 401 invalid api key");
    }

    #[test]
    fn test_embedding_error_timeout_display() {
        let err = EmbeddingError::Timeout("deadline exceeded".to_string());
        assert!(err.to_string().contains("timed out"));
    }

    // ========== LlmError Tests ==========

    #[test]
    fn test_llm_error_stream_display() {
        let err = LlmError::Stream("connection reset".to_string());
        assert_eq!(err.to_string(), "stream error: connection reset");
    }

    #[test]
    fn test_llm_error_invalid_response_display() {
        let err = LlmError::InvalidResponse("no choices".to_string());
        assert_eq!(err.to_string(), "invalid llm response: no choices");
    }

    // ========== VectorStoreError Tests ==========

    #[test]
    fn test_store_error_dimension_mismatch_display() {
        let err = VectorStoreError::DimensionMismatch {
            expected: 1536,
            actual: 384,
        };
        assert_eq!(
            err.to_string(),
            "vector length 384 does not match index dimension 1536"
        );
    }

    #[test]
    fn test_store_error_persist_display() {
        let err = VectorStoreError::Persist("rename failed".to_string());
        assert_eq!(err.to_string(), "persistence failed: rename failed");
    }

    // ========== ConfigurationError Tests ==========

    #[test]
    fn test_configuration_error_no_active_display() {
        let err = ConfigurationError::NoActiveConfiguration;
        assert_eq!(err.to_string(), "no active configuration");
    }

    #[test]
    fn test_configuration_error_missing_backend_display() {
        let err = ConfigurationError::MissingBackend("pinecone".to_string());
        assert!(err.to_string().contains("pinecone"));
    }

    // ========== ProcessingError Tests ==========

    #[test]
    fn test_processing_error_from_embedding() {
        let embed_err = EmbeddingError::Api("rate limited".to_string());
        let err: ProcessingError = embed_err.into();
        assert!(matches!(err, ProcessingError::Embedding(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_processing_error_from_store() {
        let store_err = VectorStoreError::Insert("write failed".to_string());
        let err: ProcessingError = store_err.into();
        assert!(matches!(err, ProcessingError::Store(_)));
    }

    // ========== Main Error Tests ==========

    #[test]
    fn test_error_from_extraction_error() {
        let extract_err = ExtractionError::Parse("bad pdf".to_string());
        let err: Error = extract_err.into();
        assert!(matches!(err, Error::Extraction(_)));
        assert!(err.to_string().contains("bad pdf"));
    }

    #[test]
    fn test_error_from_configuration_error() {
        let config_err = ConfigurationError::NoActiveConfiguration;
        let err: Error = config_err.into();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_error_chain_io_to_extraction_to_main() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let extract_err: ExtractionError = io_err.into();
        let main_err: Error = extract_err.into();

        assert!(matches!(
            main_err,
            Error::Extraction(ExtractionError::Io(_))
        ));
        assert!(main_err.to_string().contains("extraction error"));
    }

    #[test]
    fn test_result_type_alias() {
        fn ok_fn() -> Result<u32> {
            Ok(7)
        }

        fn err_fn() -> Result<u32> {
            Err(Error::Other("boom".to_string()))
        }

        assert!(ok_fn().is_ok());
        assert!(err_fn().is_err());
    }
}
