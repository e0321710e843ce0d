pub mod batcher;
pub mod client;
pub mod error;
pub mod pipeline;
pub mod reassembler;

pub use adk_stream_types as types;
pub use adk_stream_utils as utils;

pub use batcher::OutboundBatcher;
pub use client::{
    connect, connect_with_config, Client, Config, ConnectionStatus, EnvelopeSink, InboundStream,
    SessionEvent,
};
pub use error::{FrameError, MediaError, SendError, TransportError};
pub use pipeline::{PipelineCommand, PipelineEvent, PipelineHandle};
pub use reassembler::{Message, MessageId, MessageUpdate, Role, TurnReassembler, TurnState};
