#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod error;
mod producer;

pub use error::HttpError;
pub use producer::{JsonProducer, JsonProducerBuilder};

pub use reqwest::{Client, Method, Url};
