use thiserror::Error;

/// Errors raised while expanding a mechanism record into elemental steps or while decoding
/// step labels and enzyme-complex names.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MechanismError {
    #[error("Unknown mechanism kind '{0}'. Expected one of: sequential, ping-pong, random")]
    UnknownKind(String),
    #[error("Unknown rate law family '{0}'. Expected one of: elemental, michaelis-menten, custom")]
    UnknownFamily(String),
    #[error(
        "Ping-pong mechanism of reaction {reaction} requires equal substrate and product counts, found {substrates} substrates and {products} products"
    )]
    PingPongMismatch {
        reaction: String,
        substrates: usize,
        products: usize,
    },
    #[error("Random mechanism of reaction {reaction} supports at most {max} ligands per side, found {found}")]
    TooManyLigands {
        reaction: String,
        max: usize,
        found: usize,
    },
    #[error("Invalid identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: String },
    #[error("Malformed step label '{0}'. Expected '{{reaction}}_{{step}}'")]
    MalformedLabel(String),
    #[error("Malformed enzyme complex name '{0}'")]
    MalformedComplex(String),
    #[error("Duplicate mechanism for reaction {0}")]
    DuplicateReaction(String),
    #[error("Reaction {0} uses a custom rate law but no expression was given")]
    MissingRateLaw(String),
}
