pub mod align;
pub mod args;
pub mod audio;
pub mod background;
pub mod captions;
pub mod comments;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod media;
pub mod openai;
pub mod pipeline;
pub mod reddit;
pub mod render;
pub mod retry;
pub mod selection;
pub mod subtitle;
pub mod tagdb;
pub mod text;
pub mod thumbnail;
pub mod tts;
