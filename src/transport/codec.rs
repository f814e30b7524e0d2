//! Message I/O with `SCM_RIGHTS` descriptor passing.
//!
//! One control message is one `sendmsg` call: header and payload in a single
//! iovec, descriptors as ancillary data on the same call. Receiving reads the
//! fixed header first, validates its flags and size, reads exactly the declared
//! payload, and only then maps the request code.
//! `EINTR` is retried at both points and never surfaces to callers.

use crate::error::{Error, Result};
use crate::protocol::{
    ControlMessage, FrameHeader, MAX_PAYLOAD_SIZE, VHOST_MEMORY_MAX_NREGIONS, VHOST_USER_HDR_SIZE,
};
use rustix::fd::{AsFd, BorrowedFd, OwnedFd};
use rustix::io::Errno;
use rustix::net::{
    RecvAncillaryBuffer, RecvAncillaryMessage, RecvFlags, SendAncillaryBuffer,
    SendAncillaryMessage, SendFlags, recvmsg, sendmsg,
};
use std::io::{self, IoSlice, IoSliceMut};
use std::mem::MaybeUninit;

/// Maximum number of descriptors attached to one message.
pub const MAX_FDS_PER_MESSAGE: usize = VHOST_MEMORY_MAX_NREGIONS;

// CMSG_SPACE(8 * sizeof(int)) is 48 on 64-bit Linux.
const ANCILLARY_SPACE: usize = 64;

/// Send a message with `fds` attached.
///
/// Returns the number of bytes written, which is always the header size plus
/// the declared payload length.
pub fn send_message<Fd: AsFd>(
    socket: Fd,
    message: &ControlMessage,
    fds: &[BorrowedFd<'_>],
) -> Result<usize> {
    if fds.len() > MAX_FDS_PER_MESSAGE {
        return Err(Error::Transport(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("too many fds: {} > {}", fds.len(), MAX_FDS_PER_MESSAGE),
        )));
    }

    let buf = message.encode();

    let mut ancillary_space: [MaybeUninit<u8>; ANCILLARY_SPACE] =
        [const { MaybeUninit::uninit() }; ANCILLARY_SPACE];
    let mut ancillary = SendAncillaryBuffer::new(&mut ancillary_space);
    if !fds.is_empty() && !ancillary.push(SendAncillaryMessage::ScmRights(fds)) {
        return Err(Error::Transport(io::Error::new(
            io::ErrorKind::InvalidInput,
            "failed to add fds to ancillary buffer",
        )));
    }

    let iov = [IoSlice::new(&buf)];
    let sent = loop {
        match sendmsg(&socket, &iov, &mut ancillary, SendFlags::empty()) {
            Err(Errno::INTR) => continue,
            other => break other?,
        }
    };

    if sent != buf.len() {
        return Err(Error::Transport(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("short write: {} of {} bytes", sent, buf.len()),
        )));
    }

    Ok(sent)
}

/// Receive one complete message whose flags must equal `expected_flags`.
///
/// Descriptors that arrived with the message are returned alongside it.
pub fn recv_message<Fd: AsFd>(
    socket: Fd,
    expected_flags: u32,
) -> Result<(ControlMessage, Vec<OwnedFd>)> {
    let mut fds = Vec::new();

    let mut raw = [0u8; VHOST_USER_HDR_SIZE];
    let got = recv_chunk(&socket, &mut raw, &mut fds)?;
    if got < VHOST_USER_HDR_SIZE {
        tracing::error!(
            got,
            expected = VHOST_USER_HDR_SIZE,
            "failed to recv msg hdr"
        );
        return Err(short_read("header", got, VHOST_USER_HDR_SIZE));
    }

    let frame = FrameHeader::parse(&raw, expected_flags)?;

    let size = frame.size as usize;
    let mut body = [0u8; MAX_PAYLOAD_SIZE];
    if size > 0 {
        let got = recv_chunk(&socket, &mut body[..size], &mut fds)?;
        if got < size {
            tracing::error!(got, expected = size, "failed to recv msg payload");
            return Err(short_read("payload", got, size));
        }
    }

    // Resolved only now so a bad code still consumes its payload.
    let header = frame.resolve().inspect_err(|_| {
        tracing::error!(code = frame.code, "received unexpected msg type");
    })?;

    Ok((ControlMessage::from_parts(header, &body[..size]), fds))
}

fn recv_chunk<Fd: AsFd>(socket: Fd, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> Result<usize> {
    let mut ancillary_space: [MaybeUninit<u8>; ANCILLARY_SPACE] =
        [const { MaybeUninit::uninit() }; ANCILLARY_SPACE];
    let mut ancillary = RecvAncillaryBuffer::new(&mut ancillary_space);

    let mut iov = [IoSliceMut::new(buf)];
    let result = loop {
        match recvmsg(&socket, &mut iov, &mut ancillary, RecvFlags::CMSG_CLOEXEC) {
            Err(Errno::INTR) => continue,
            other => break other?,
        }
    };

    for msg in ancillary.drain() {
        if let RecvAncillaryMessage::ScmRights(rights) = msg {
            fds.extend(rights);
        }
    }

    Ok(result.bytes)
}

fn short_read(what: &str, got: usize, expected: usize) -> Error {
    Error::Transport(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("short {what} read: {got} of {expected} bytes"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolViolation;
    use crate::protocol::{
        Payload, RequestCode, VHOST_USER_REPLY_MASK, VHOST_USER_VERSION, VringState,
    };
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    const REPLY_FLAGS: u32 = VHOST_USER_VERSION | VHOST_USER_REPLY_MASK;

    #[test]
    fn test_send_recv_with_fds() {
        let (sender, receiver) = UnixStream::pair().unwrap();
        let file = tempfile::tempfile().unwrap();

        let msg = ControlMessage::request(RequestCode::SetVringKick, Payload::U64(2));
        let sent = send_message(&sender, &msg, &[file.as_fd()]).unwrap();
        assert_eq!(sent, VHOST_USER_HDR_SIZE + 8);

        let (received, fds) = recv_message(&receiver, VHOST_USER_VERSION).unwrap();
        assert_eq!(received, msg);
        assert_eq!(fds.len(), 1);
    }

    #[test]
    fn test_recv_without_payload() {
        let (sender, receiver) = UnixStream::pair().unwrap();
        let msg = ControlMessage::request(RequestCode::SetOwner, Payload::Empty);
        assert_eq!(send_message(&sender, &msg, &[]).unwrap(), VHOST_USER_HDR_SIZE);

        let (received, fds) = recv_message(&receiver, VHOST_USER_VERSION).unwrap();
        assert_eq!(received.request_code(), RequestCode::SetOwner);
        assert_eq!(received.payload(), &Payload::Empty);
        assert!(fds.is_empty());
    }

    #[test]
    fn test_recv_rejects_missing_reply_bit() {
        let (sender, receiver) = UnixStream::pair().unwrap();
        let msg = ControlMessage::request(RequestCode::GetFeatures, Payload::U64(1));
        send_message(&sender, &msg, &[]).unwrap();

        let err = recv_message(&receiver, REPLY_FLAGS).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolViolation::BadFlags { found: VHOST_USER_VERSION, .. })
        ));
    }

    #[test]
    fn test_recv_short_header() {
        let (mut sender, receiver) = UnixStream::pair().unwrap();
        sender.write_all(&[1, 0, 0, 0, 5]).unwrap();
        drop(sender);

        match recv_message(&receiver, REPLY_FLAGS).unwrap_err() {
            Error::Transport(io) => assert_eq!(io.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_recv_short_payload() {
        let (mut sender, receiver) = UnixStream::pair().unwrap();
        let reply = ControlMessage::reply(
            RequestCode::GetVringBase,
            Payload::VringState(VringState::new(0, 7)),
        );
        let bytes = reply.encode();
        sender.write_all(&bytes[..bytes.len() - 3]).unwrap();
        drop(sender);

        match recv_message(&receiver, REPLY_FLAGS).unwrap_err() {
            Error::Transport(io) => assert_eq!(io.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_recv_oversized_payload_is_not_read() {
        let (mut sender, receiver) = UnixStream::pair().unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&RequestCode::GetFeatures.as_u32().to_ne_bytes());
        raw.extend_from_slice(&REPLY_FLAGS.to_ne_bytes());
        raw.extend_from_slice(&(MAX_PAYLOAD_SIZE as u32 + 8).to_ne_bytes());
        sender.write_all(&raw).unwrap();

        assert!(matches!(
            recv_message(&receiver, REPLY_FLAGS).unwrap_err(),
            Error::Protocol(ProtocolViolation::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_code_consumes_its_payload() {
        let (mut sender, receiver) = UnixStream::pair().unwrap();
        let mut raw = Vec::new();
        raw.extend_from_slice(&99u32.to_ne_bytes());
        raw.extend_from_slice(&REPLY_FLAGS.to_ne_bytes());
        raw.extend_from_slice(&8u32.to_ne_bytes());
        raw.extend_from_slice(&0xdead_beef_u64.to_ne_bytes());
        sender.write_all(&raw).unwrap();

        let next = ControlMessage::reply(RequestCode::GetFeatures, Payload::U64(3));
        sender.write_all(&next.encode()).unwrap();

        assert!(matches!(
            recv_message(&receiver, REPLY_FLAGS).unwrap_err(),
            Error::Protocol(ProtocolViolation::UnknownRequestCode(99))
        ));
        let (received, _) = recv_message(&receiver, REPLY_FLAGS).unwrap();
        assert_eq!(received, next);
    }

    #[test]
    fn test_send_too_many_fds_fails() {
        let (sender, _receiver) = UnixStream::pair().unwrap();
        let files: Vec<_> = (0..=MAX_FDS_PER_MESSAGE)
            .map(|_| tempfile::tempfile().unwrap())
            .collect();
        let fds: Vec<_> = files.iter().map(|f| f.as_fd()).collect();
        let msg = ControlMessage::request(RequestCode::SetMemTable, Payload::Empty);
        assert!(send_message(&sender, &msg, &fds).is_err());
    }
}
