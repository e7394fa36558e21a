//! Durable identities and the registry that owns them.

mod registry;
mod types;

pub use registry::IdentityRegistry;
pub use types::{
    is_hex_color, DisplayNick, Identity, IdentityError, COLOR_PREFIX_LEN, DEFAULT_COLOR,
    DEFAULT_STATUS,
};
