//! The dump session: request the table, pull buffers, decode messages.

use std::io;
use std::ops::ControlFlow;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::decode::decode_flow;
use crate::error::DecodeError;
use crate::flow::Flow;
use crate::message::{
    MessageIterator, NFGEN_LEN, NLMSG_DONE, NLMSG_ERROR, NLMSG_NOOP, NLMSG_OVERRUN, dump_request,
};
use crate::socket::NetlinkSocket;

/// Large enough for a full page of conntrack entries per datagram; the
/// kernel fragments a dump across as many datagrams as needed.
const RECV_BUFFER_SIZE: usize = 32 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("response sequence {got} does not match request {want}")]
    SequenceMismatched { want: u32, got: u32 },

    #[error("response port id {got} does not match socket {want}")]
    PortMismatched { want: u32, got: u32 },

    #[error("response is too short")]
    TooShort,

    #[error("kernel reported data loss")]
    Overrun,
}

/// Source of raw dump datagrams. The production implementation is
/// [`NetlinkSocket`]; tests substitute an in-memory queue.
pub trait Transport {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Blocks until the next datagram is available. Returns the number of
    /// bytes copied into `buf`; 0 means the transport is exhausted.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Port id responses are addressed to.
    fn portid(&self) -> u32;
}

impl Transport for NetlinkSocket {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        NetlinkSocket::send(self, buf)
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        NetlinkSocket::receive(self, buf)
    }

    fn portid(&self) -> u32 {
        NetlinkSocket::portid(self)
    }
}

pub struct DumpSession<T> {
    transport: T,
    sequence: u32,
}

impl<T: Transport> DumpSession<T> {
    pub fn new(transport: T) -> Self {
        let sequence = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or(1);

        DumpSession {
            transport,
            sequence,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Issues the dump request for `family` and pulls buffers until the
    /// kernel signals completion, handing each decoded flow to `f`.
    /// Returning `Break` stops the session once the current buffer is
    /// finished; its remaining messages are cheap to decode once fetched.
    pub fn run<F>(&mut self, family: u8, mut f: F) -> Result<(), Error>
    where
        F: FnMut(Flow) -> ControlFlow<()>,
    {
        let request = dump_request(family, self.sequence);
        self.transport.send(&request)?;

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let read = self.transport.receive(&mut buf)?;
            if read == 0 {
                return Ok(());
            }

            let mut stop = false;
            for item in MessageIterator::new(&buf[..read]) {
                let msg = match item {
                    Ok(msg) => msg,
                    Err(err) => {
                        // without a trustworthy message length the rest of
                        // the buffer cannot be framed
                        warn!(message = "abandoning remainder of buffer", ?err);

                        break;
                    }
                };

                let header = msg.header;
                if header.typ == NLMSG_NOOP {
                    continue;
                }

                if header.sequence != self.sequence {
                    return Err(Error::SequenceMismatched {
                        want: self.sequence,
                        got: header.sequence,
                    });
                }

                let portid = self.transport.portid();
                if header.pid != portid {
                    return Err(Error::PortMismatched {
                        want: portid,
                        got: header.pid,
                    });
                }

                match header.typ {
                    NLMSG_DONE => return Ok(()),
                    NLMSG_ERROR => {
                        if msg.payload.len() < 4 {
                            return Err(Error::TooShort);
                        }

                        let code =
                            i32::from_ne_bytes(msg.payload[..4].try_into().unwrap());
                        if code != 0 {
                            // the kernel reports a negative errno
                            return Err(Error::Io(io::Error::from_raw_os_error(-code)));
                        }

                        // code 0 is an acknowledgement
                    }
                    NLMSG_OVERRUN => return Err(Error::Overrun),
                    _ if header.is_conntrack() => {
                        if msg.payload.len() < NFGEN_LEN {
                            warn!(
                                message = "dropping conntrack message without nfgenmsg",
                                len = msg.payload.len()
                            );

                            continue;
                        }

                        let mut flow = Flow::default();
                        match decode_flow(&msg.payload[NFGEN_LEN..], &mut flow) {
                            Ok(()) => {}
                            Err(err @ DecodeError::Truncated { .. }) => {
                                // field boundaries are gone, drop the message
                                warn!(message = "dropping truncated message", ?err);

                                continue;
                            }
                            Err(err) => {
                                // deliver whatever decoded before the failure
                                warn!(message = "delivering partial flow", ?err);
                            }
                        }

                        if f(flow).is_break() {
                            stop = true;
                        }
                    }
                    typ => {
                        debug!(message = "skipping unexpected message type", typ);
                    }
                }
            }

            if stop {
                return Ok(());
            }
        }
    }
}
