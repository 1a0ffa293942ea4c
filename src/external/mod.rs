pub mod artifact;
pub mod mailer;

pub use artifact::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
pub use mailer::{Mailer, RecordingMailer, TracingMailer};
