pub mod activation;
pub mod embedding;
pub mod linear;

pub use activation::Tanh;
pub use embedding::Embedding;
pub use linear::Linear;
