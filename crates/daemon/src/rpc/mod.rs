// Session transport: one WebSocket connection per session.

pub mod ws;
