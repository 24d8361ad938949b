//! Session protocol: control tokens and the key seam.

pub mod cipher;
pub mod control;

pub use cipher::{AuthFailure, KeyedDigestCipher, SessionCipher};
pub use control::ControlToken;
