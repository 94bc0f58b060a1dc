//! Concrete collaborators for the resolver and voice transport seams.

pub mod simulated;
pub mod ytdlp;

pub use simulated::SimulatedTransport;
pub use ytdlp::YtDlpResolver;
