//! Self-describing binary serialization of trees.
//!
//! The format is a magic number and version followed by one record per
//! node in prefix order: a tag byte for the kind, then the payload,
//! then the children. Strings are length-prefixed UTF-8; naturals are
//! little-endian byte strings. Positions are not persisted; everything
//! read back sits at [`SourcePos::NOWHERE`].

use std::io::{Cursor, Read, Seek, Write};

use binrw::{binrw, BinRead, BinResult, BinWrite};
use ecow::EcoString;
use num_bigint::BigUint;

use crate::{
    error::TiliaResult,
    position::SourcePos,
    tree::{Kind, Tree},
};

#[binrw]
#[brw(little, magic = b"TILT")]
struct Header {
    version: u16,
}

const VERSION: u16 = 1;

const TAG_NATURAL: u8 = 0;
const TAG_REAL: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_NAME: u8 = 3;
const TAG_BLOCK: u8 = 4;
const TAG_PREFIX: u8 = 5;
const TAG_POSTFIX: u8 = 6;
const TAG_INFIX: u8 = 7;

/// Serialize a tree into a fresh byte vector.
///
/// # Errors
///
/// * [`crate::error::TiliaError::Format`] when writing fails.
pub fn to_bytes(tree: &Tree) -> TiliaResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write(tree, &mut cursor)?;
    Ok(cursor.into_inner())
}

/// Deserialize a tree from bytes produced by [`to_bytes`].
///
/// # Errors
///
/// * [`crate::error::TiliaError::Format`] on a bad magic number, an
///   unsupported version, or truncated or malformed records.
pub fn from_bytes(bytes: &[u8]) -> TiliaResult<Tree> {
    let mut cursor = Cursor::new(bytes);
    read(&mut cursor)
}

/// Serialize a tree to a writer.
///
/// # Errors
///
/// * [`crate::error::TiliaError::Format`] when writing fails.
pub fn write<W: Write + Seek>(tree: &Tree, writer: &mut W) -> TiliaResult<()> {
    Header { version: VERSION }.write(writer)?;
    write_node(tree, writer)?;
    Ok(())
}

/// Deserialize a tree from a reader.
///
/// # Errors
///
/// * [`crate::error::TiliaError::Format`] on malformed input.
pub fn read<R: Read + Seek>(reader: &mut R) -> TiliaResult<Tree> {
    let header = Header::read(reader)?;
    if header.version != VERSION {
        return Err(binrw::Error::AssertFail {
            pos: 0,
            message: format!("unsupported format version {}", header.version),
        }
        .into());
    }
    Ok(read_node(reader)?)
}

fn write_str<W: Write + Seek>(value: &str, writer: &mut W) -> BinResult<()> {
    (value.len() as u32).write_le(writer)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn write_node<W: Write + Seek>(tree: &Tree, writer: &mut W) -> BinResult<()> {
    match tree.kind() {
        Kind::Natural => {
            if let Some((value, base)) = tree.as_natural() {
                TAG_NATURAL.write_le(writer)?;
                base.write_le(writer)?;
                let bytes = value.to_bytes_le();
                (bytes.len() as u32).write_le(writer)?;
                writer.write_all(&bytes)?;
            }
        }
        Kind::Real => {
            if let Some(value) = tree.as_real() {
                TAG_REAL.write_le(writer)?;
                value.write_le(writer)?;
            }
        }
        Kind::Text => {
            if let (Some(value), Some((open, close))) = (tree.as_text(), tree.text_delimiters()) {
                TAG_TEXT.write_le(writer)?;
                write_str(value, writer)?;
                write_str(open, writer)?;
                write_str(close, writer)?;
            }
        }
        Kind::Name => {
            if let Some(value) = tree.as_name() {
                TAG_NAME.write_le(writer)?;
                write_str(value, writer)?;
            }
        }
        Kind::Block => {
            if let (Some(child), Some((open, close))) =
                (tree.block_child(), tree.block_delimiters())
            {
                TAG_BLOCK.write_le(writer)?;
                write_str(open, writer)?;
                write_str(close, writer)?;
                write_node(&child, writer)?;
            }
        }
        Kind::Prefix => {
            if let Some((left, right)) = tree.prefix_parts() {
                TAG_PREFIX.write_le(writer)?;
                write_node(&left, writer)?;
                write_node(&right, writer)?;
            }
        }
        Kind::Postfix => {
            if let Some((left, right)) = tree.postfix_parts() {
                TAG_POSTFIX.write_le(writer)?;
                write_node(&left, writer)?;
                write_node(&right, writer)?;
            }
        }
        Kind::Infix => {
            if let Some((name, left, right)) = tree.infix_parts() {
                TAG_INFIX.write_le(writer)?;
                write_str(name, writer)?;
                write_node(&left, writer)?;
                write_node(&right, writer)?;
            }
        }
    }
    Ok(())
}

fn read_str<R: Read + Seek>(reader: &mut R) -> BinResult<EcoString> {
    let length = u32::read_le(reader)?;
    let mut buffer = vec![0_u8; length as usize];
    reader.read_exact(&mut buffer)?;
    match String::from_utf8(buffer) {
        Ok(string) => Ok(string.into()),
        Err(error) => Err(binrw::Error::Custom {
            pos: reader.stream_position().unwrap_or_default(),
            err: Box::new(error),
        }),
    }
}

fn read_node<R: Read + Seek>(reader: &mut R) -> BinResult<Tree> {
    let pos = SourcePos::NOWHERE;
    let tag = u8::read_le(reader)?;
    match tag {
        TAG_NATURAL => {
            let base = u8::read_le(reader)?;
            let length = u32::read_le(reader)?;
            let mut bytes = vec![0_u8; length as usize];
            reader.read_exact(&mut bytes)?;
            Ok(Tree::based_natural(
                BigUint::from_bytes_le(&bytes),
                base,
                pos,
            ))
        }
        TAG_REAL => Ok(Tree::real(f64::read_le(reader)?, pos)),
        TAG_TEXT => {
            let value = read_str(reader)?;
            let open = read_str(reader)?;
            let close = read_str(reader)?;
            Ok(Tree::delimited_text(value, open, close, pos))
        }
        TAG_NAME => Ok(Tree::name(read_str(reader)?, pos)),
        TAG_BLOCK => {
            let open = read_str(reader)?;
            let close = read_str(reader)?;
            let child = read_node(reader)?;
            Ok(Tree::block(child, open, close, pos))
        }
        TAG_PREFIX => {
            let left = read_node(reader)?;
            let right = read_node(reader)?;
            Ok(Tree::prefix(left, right, pos))
        }
        TAG_POSTFIX => {
            let left = read_node(reader)?;
            let right = read_node(reader)?;
            Ok(Tree::postfix(left, right, pos))
        }
        TAG_INFIX => {
            let name = read_str(reader)?;
            let left = read_node(reader)?;
            let right = read_node(reader)?;
            Ok(Tree::infix(name, left, right, pos))
        }
        _ => Err(binrw::Error::AssertFail {
            pos: reader.stream_position().unwrap_or_default(),
            message: format!("unknown node tag {tag}"),
        }),
    }
}
