mod error;
mod topics;
mod transport;

pub use error::DeliveryServiceError;
pub use topics::{direct_channel, feed_channel, DIRECT_GROUP, FEED_GROUP};
pub use transport::{DeliveryService, InboundPacket, OutboundPacket, ServerEvent};
