pub mod ngram;
pub mod openai;

pub use ngram::NgramEmbeddingProvider;
pub use openai::OpenAiEmbeddingProvider;
