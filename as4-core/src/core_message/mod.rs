//! ebMS3 message model and wire codec

pub mod codec;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod mime;
pub mod security;
mod xml;

pub use codec::{decode, encode, WireMessage};
pub use envelope::{
    Attachment, CollaborationInfo, EbmsError, Envelope, ErrorSignal, MessageInfo, MessageUnit,
    PartInfo, Party, PartyInfo, Property, PullRequest, Receipt, Severity, SoapVersion,
    UserMessage, DEFAULT_MPC, EMPTY_MPC_ERROR_CODE,
};
pub use errors::CodecError;
pub use ids::{generate_message_id, DEFAULT_MESSAGE_ID_SUFFIX};
pub use security::{KeyInfo, SecurityHeader, SecurityTimestamp, SignedInfo, XmlSignature};
