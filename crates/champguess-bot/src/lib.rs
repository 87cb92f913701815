// Library root for the chat-facing bot: config, the Data Dragon content
// provider, the bridge protocol and the event loop that ties them to the
// game core.

pub mod app;
pub mod commands;
pub mod config;
pub mod ddragon;
pub mod gateway;
pub mod legacy;
pub mod protocol;
