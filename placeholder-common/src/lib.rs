pub mod dates;
pub mod docstore;
pub mod error;
pub mod mapper;
pub mod message;
pub mod model;
pub mod native;
pub mod resolver;
pub mod validator;
