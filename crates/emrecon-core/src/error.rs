use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid MRC volume: {0}")]
    InvalidVolume(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },

    #[error("unknown symmetry group: {0}")]
    UnknownSymmetry(String),

    #[error("particle {0} missing from database")]
    MissingParticle(u32),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("reconstruction error: {0}")]
    Reconstruction(String),

    #[error("empty particle set")]
    EmptyParticleSet,
}

pub type Result<T> = std::result::Result<T, EmError>;
