//! Lanthorn OpenID
//!
//! Provider side of OpenID Authentication 2.0: association negotiation,
//! assertion signing, `check_authentication` verification, realm checks and
//! discovery. The engine is transport-agnostic; it consumes decoded request
//! parameters and produces [`OpenIdResponse`] values for the host to render.

pub mod associate;
pub mod ax;
pub mod config;
pub mod discovery;
pub mod error;
pub mod message;
pub mod provider;
pub mod realm;
pub mod response;

pub use ax::{AttributeValue, AttributeValues, FetchRequest};
pub use config::ProviderConfig;
pub use discovery::{DiscoveryDocument, DiscoveryFormat};
pub use error::ProviderError;
pub use message::{Extension, KeyValueForm, Message};
pub use provider::{
    AuthContext, AuthDecision, AuthHook, Authentication, IncomingRequest, Provider, RequestMethod,
};
pub use realm::{Realm, RealmError};
pub use response::{DirectStatus, OpenIdResponse};
