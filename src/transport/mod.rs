pub mod dialer;
pub mod listener;
pub mod stream;

pub use dialer::dial;
pub use listener::Listener;
pub use stream::{PeerAddr, ReadHalf, Stream, WriteHalf};
