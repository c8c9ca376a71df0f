pub mod completion;
pub mod config;
pub mod descriptors;
pub mod pipeline;
pub mod prompt;
pub mod sampler;
pub mod sink;
