pub mod chat_complete_route;
pub mod chat_models_route;
pub mod chat_request;
pub mod chat_stream_route;
