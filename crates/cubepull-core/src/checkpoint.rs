use crate::types::Checkpoint;

/// Durable storage for the single progress [`Checkpoint`].
pub trait CheckpointStore: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the checkpoint. Fails when none has been bootstrapped; there is
    /// no implicit empty checkpoint.
    fn load(&self) -> Result<Checkpoint, Self::Error>;

    /// Replace the stored checkpoint. Readers never observe a partial write.
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), Self::Error>;
}
