//! Wire protocol codecs for the three channels this bridge speaks to the
//! RIO: UDP control/status (§4.3), TCP auxiliary (§4.4), and NetworkTables
//! (§4.5). Each submodule is a pure encoder/decoder with no socket I/O of
//! its own, so it can be exercised directly from unit tests.

pub mod nt;
pub mod tcp;
pub mod udp;
