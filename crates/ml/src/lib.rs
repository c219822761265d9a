//! `bassline-ml` -- external collaborator contracts and their adapters.
//!
//! The worker loops depend only on the traits in [`contract`]:
//! [`AudioFetcher`] for the fetch stage and [`InferenceClient`] for the
//! submit and reconciliation stages. [`HttpInferenceClient`] talks to
//! the ML inference server over HTTP; [`YtDlpFetcher`] shells out to
//! `yt-dlp`. Both are safe to use concurrently from independent worker
//! instances -- they share no state between invocations.

pub mod contract;
pub mod error;
pub mod http;
pub mod ytdlp;

pub use contract::{
    AudioFetcher, InferenceClient, NoteEvent, ProcessRequest, ProcessResponse, ProcessResult,
    RemoteStatus, StatusResponse, TabEvent,
};
pub use error::MlError;
pub use http::HttpInferenceClient;
pub use ytdlp::YtDlpFetcher;
