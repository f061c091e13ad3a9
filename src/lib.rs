// src/lib.rs

pub mod autograd;
pub mod data;
pub mod init;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod module;
pub mod ops;
pub mod trainer;
