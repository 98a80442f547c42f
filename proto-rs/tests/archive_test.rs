use pwa_offline_proto::*;
use std::io::Cursor;

mod common;
use common::sample_entries;

#[test]
fn write_and_read_archive() {
    let mut buffer = Vec::new();
    let mut writer = SnapshotWriter::new(&mut buffer);

    let header = ArchiveHeader::with_timestamp(1_729_339_200_000);
    writer.write_header(&header).unwrap();

    let entries = sample_entries();
    for entry in &entries {
        writer.write_entry(entry).unwrap();
    }
    writer.flush().unwrap();
    assert!(writer.header_written());

    let mut reader = SnapshotReader::new(Cursor::new(buffer));
    let read_header = reader.read_header().unwrap();
    assert_eq!(read_header, header);

    let read_entries = reader.read_all_entries().unwrap();
    assert_eq!(read_entries, entries);
}

#[test]
fn header_can_only_be_written_once() {
    let mut writer = SnapshotWriter::new(Vec::new());
    writer.write_header(&ArchiveHeader::new()).unwrap();
    assert!(writer.write_header(&ArchiveHeader::new()).is_err());
}

#[test]
fn rejects_foreign_magic() {
    let mut reader = SnapshotReader::new(Cursor::new(b"DCRR".repeat(8)));
    let err = reader.read_header().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn truncated_entry_is_an_error() {
    let mut buffer = Vec::new();
    let mut writer = SnapshotWriter::new(&mut buffer);
    writer.write_header(&ArchiveHeader::new()).unwrap();
    writer.write_entry(&sample_entries()[0]).unwrap();
    buffer.truncate(buffer.len() - 3);

    let mut reader = SnapshotReader::new(Cursor::new(buffer));
    reader.read_header().unwrap();
    assert!(reader.read_entry().is_err());
}

#[test]
fn snapshot_blob_round_trip_keeps_headers_and_kind() {
    let entry = &sample_entries()[3];
    let blob = encode_snapshot(&entry.response).unwrap();
    let decoded = decode_snapshot(&blob).unwrap();
    assert_eq!(decoded.kind, ResponseKind::Cors);
    assert_eq!(decoded.content_type(), "text/css");
    assert!(decode_snapshot(&blob[..blob.len() / 2]).is_err());
}

#[test]
fn oversized_entry_length_is_rejected_before_reading() {
    let mut buffer = Vec::new();
    let mut writer = SnapshotWriter::new(&mut buffer);
    writer.write_header(&ArchiveHeader::new()).unwrap();
    buffer.extend_from_slice(&u32::MAX.to_be_bytes());
    buffer.extend_from_slice(b"tail");

    let mut reader = SnapshotReader::new(Cursor::new(buffer));
    reader.read_header().unwrap();
    let err = reader.read_entry().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    assert!(err.to_string().contains(&MAX_ENTRY_SIZE.to_string()));
}
