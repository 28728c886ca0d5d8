//! Length-prefixed packet stream container.
//!
//! Stands in for the visual channel during development and testing: an
//! opaque sequence of packets with no delivery guarantees. The impairment
//! helper mangles a stream the way a flaky camera path would (loss,
//! reordering), which is exactly the contract the decoder is built for.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Magic bytes opening a packet stream file.
const STREAM_MAGIC: &[u8; 4] = b"LNT1";

/// Write packets into a stream container.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_stream(path: &Path, packets: &[Vec<u8>]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(STREAM_MAGIC)?;
    for packet in packets {
        let len = u32::try_from(packet.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "packet too large"))?;
        out.write_all(&len.to_be_bytes())?;
        out.write_all(packet)?;
    }
    out.flush()
}

/// Read every packet from a stream container.
///
/// # Errors
///
/// Returns an error on I/O failure, a bad magic number, or a truncated
/// record.
pub fn read_stream(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;

    if bytes.len() < STREAM_MAGIC.len() || &bytes[..STREAM_MAGIC.len()] != STREAM_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a LANTERN packet stream",
        ));
    }

    let mut packets = Vec::new();
    let mut pos = STREAM_MAGIC.len();
    while pos < bytes.len() {
        if pos + 4 > bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated record length",
            ));
        }
        let len =
            u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
                as usize;
        pos += 4;
        if pos + len > bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated record body",
            ));
        }
        packets.push(bytes[pos..pos + len].to_vec());
        pos += len;
    }
    Ok(packets)
}

/// Apply channel impairments: drop every `drop_every`-th frame (0 keeps
/// all), then optionally shuffle with a seeded generator.
#[must_use]
pub fn impair(packets: Vec<Vec<u8>>, drop_every: u32, shuffle: bool, seed: u64) -> Vec<Vec<u8>> {
    let mut kept: Vec<Vec<u8>> = packets
        .into_iter()
        .enumerate()
        .filter(|(i, _)| drop_every == 0 || (i + 1) % drop_every as usize != 0)
        .map(|(_, p)| p)
        .collect();
    if shuffle {
        kept.shuffle(&mut StdRng::seed_from_u64(seed));
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_packets() -> Vec<Vec<u8>> {
        (0..10u8).map(|i| vec![i; 16 + i as usize]).collect()
    }

    #[test]
    fn test_stream_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.pkts");
        let packets = sample_packets();

        write_stream(&path, &packets).unwrap();
        assert_eq!(read_stream(&path).unwrap(), packets);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.pkts");
        std::fs::write(&path, b"XXXX\x00\x00\x00\x01a").unwrap();
        assert!(read_stream(&path).is_err());
    }

    #[test]
    fn test_truncated_record_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cut.pkts");
        let packets = sample_packets();
        write_stream(&path, &packets).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&path, &bytes).unwrap();

        assert!(read_stream(&path).is_err());
    }

    #[test]
    fn test_impair_drops_and_shuffles_deterministically() {
        let packets = sample_packets();
        let dropped = impair(packets.clone(), 5, false, 0);
        assert_eq!(dropped.len(), 8);
        assert!(!dropped.contains(&packets[4]));
        assert!(!dropped.contains(&packets[9]));

        let a = impair(packets.clone(), 0, true, 99);
        let b = impair(packets.clone(), 0, true, 99);
        assert_eq!(a, b);
        assert_eq!(a.len(), packets.len());
    }
}
