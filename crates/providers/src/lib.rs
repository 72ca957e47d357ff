pub mod chat_query;

pub use chat_query::{
    run_query, ChatQueryRequest, ChatQueryResponse, ChatTransport, HttpChatClient, Source,
    TransportError,
};
