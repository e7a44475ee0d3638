//! Completion events posted to the reactor.
//!
//! Every operation issued on behalf of an endpoint or timer finishes by
//! posting exactly one `Completion` tagged with the id of its owner, which
//! the reactor uses to correlate it with the registry entry.

use bytes::Bytes;
use std::fmt;
use std::io;

/// Identifier of an endpoint in the reactor's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(pub(crate) usize);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep{}", self.0)
    }
}

/// Identifier of a timer in the reactor's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) usize);

/// Result of one finished operation.
#[derive(Debug)]
pub enum Completion {
    /// A read-some finished. `Ok` with an empty chunk means end of stream.
    Read {
        endpoint: EndpointId,
        result: io::Result<Bytes>,
    },
    /// A write-some finished, reporting how many bytes the pipe accepted.
    Write {
        endpoint: EndpointId,
        result: io::Result<usize>,
    },
    /// A timer deadline elapsed.
    Timer { timer: TimerId },
    /// Stop requested through a `ReactorHandle`.
    Stop,
}

impl Completion {
    /// Short operation name for logging.
    pub fn op_name(&self) -> &'static str {
        match self {
            Completion::Read { .. } => "read",
            Completion::Write { .. } => "write",
            Completion::Timer { .. } => "timer",
            Completion::Stop => "stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_names() {
        let read = Completion::Read {
            endpoint: EndpointId(0),
            result: Ok(Bytes::from_static(b"x")),
        };
        let write = Completion::Write {
            endpoint: EndpointId(1),
            result: Ok(1),
        };
        assert_eq!(read.op_name(), "read");
        assert_eq!(write.op_name(), "write");
        assert_eq!(Completion::Timer { timer: TimerId(3) }.op_name(), "timer");
        assert_eq!(Completion::Stop.op_name(), "stop");
        assert_eq!(EndpointId(7).to_string(), "ep7");
    }
}
