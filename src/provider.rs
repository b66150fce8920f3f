pub mod constants;
pub(crate) mod openai;

pub use openai::OpenAiTransport;
