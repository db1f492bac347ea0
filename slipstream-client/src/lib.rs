//! Participant-side pieces: the local simulation session, the relay
//! link, and the facade the rendering and input layers talk to.

pub mod game;
pub mod net;
pub mod session;
