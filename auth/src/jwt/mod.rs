pub mod claims;
pub mod codec;
pub mod errors;

pub use claims::Claims;
pub use codec::IssuedToken;
pub use codec::TokenCodec;
pub use errors::JwtError;
