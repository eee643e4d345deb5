//! Reading a complete archive held in memory.
//!
//! Archives produced by `zip` writing to a pipe carry data descriptors, so
//! the local headers do not hold usable sizes. Everything here is therefore
//! driven by the central directory:
//!
//! 1. find the End of Central Directory record at the tail
//! 2. follow the ZIP64 locator if the EOCD fields are saturated
//! 3. parse one central directory header per entry
//! 4. for extraction, skip the entry's local header and inflate its data

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::DeflateDecoder;
use std::io::{Cursor, Read};

use anyhow::{Context, Result, bail, ensure};

use super::structures::*;

/// Largest comment the EOCD can carry, which bounds the backwards search
const MAX_COMMENT_SIZE: usize = 0xFFFF;

/// Index of the entries of an in-memory archive
pub struct ArchiveIndex<'a> {
    data: &'a [u8],
    entries: Vec<ZipEntry>,
}

impl<'a> ArchiveIndex<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let (eocd, eocd_offset) = find_eocd(data)?;

        let (cd_offset, cd_size, total_entries) = if eocd.needs_zip64() {
            let locator_offset = eocd_offset
                .checked_sub(Zip64Locator::SIZE)
                .context("Missing ZIP64 locator")?;
            let locator = Zip64Locator::from_bytes(&data[locator_offset..])?;
            let eocd64 = Zip64EndOfCentralDirectory::from_bytes(slice_from(
                data,
                locator.eocd64_offset,
            )?)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        let cd_start = usize::try_from(cd_offset)?;
        let cd_end = cd_start
            .checked_add(usize::try_from(cd_size)?)
            .filter(|end| *end <= data.len())
            .context("Central Directory runs past the end of the archive")?;

        let mut cursor = Cursor::new(&data[cd_start..cd_end]);
        let entries = (0..total_entries)
            .map(|_| parse_cdfh(&mut cursor))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { data, entries })
    }

    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    pub fn find(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.file_name == name)
    }

    /// Decompress one entry and check it against the recorded CRC
    pub fn read(&self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let header = slice_from(self.data, entry.lfh_offset)?;
        ensure!(
            header.len() >= LFH_SIZE && &header[0..4] == LFH_SIGNATURE,
            "Invalid Local File Header for {}",
            entry.file_name
        );

        let mut cursor = Cursor::new(&header[26..LFH_SIZE]);
        let name_len = cursor.read_u16::<LittleEndian>()? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>()? as usize;

        let start = LFH_SIZE + name_len + extra_len;
        let end = start + usize::try_from(entry.compressed_size)?;
        let raw = header
            .get(start..end)
            .with_context(|| format!("Data for {} is truncated", entry.file_name))?;

        let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
        match entry.compression_method {
            CompressionMethod::Stored => out.extend_from_slice(raw),
            CompressionMethod::Deflate => {
                DeflateDecoder::new(raw).read_to_end(&mut out)?;
            }
            CompressionMethod::Unknown(method) => {
                bail!("Unsupported compression method {method} for {}", entry.file_name)
            }
        }

        let mut crc = flate2::Crc::new();
        crc.update(&out);
        ensure!(
            crc.sum() == entry.crc32 && out.len() as u64 == entry.uncompressed_size,
            "Checksum mismatch for {}",
            entry.file_name
        );

        Ok(out)
    }
}

fn slice_from(data: &[u8], offset: u64) -> Result<&[u8]> {
    usize::try_from(offset)
        .ok()
        .and_then(|offset| data.get(offset..))
        .context("Offset past the end of the archive")
}

fn find_eocd(data: &[u8]) -> Result<(EndOfCentralDirectory, usize)> {
    ensure!(
        data.len() >= EndOfCentralDirectory::SIZE,
        "Not a valid ZIP file"
    );

    let last = data.len() - EndOfCentralDirectory::SIZE;
    let first = last.saturating_sub(MAX_COMMENT_SIZE);

    // newest candidate first; its comment must reach exactly to the end
    for i in (first..=last).rev() {
        if &data[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
            continue;
        }
        let eocd = EndOfCentralDirectory::from_bytes(&data[i..])?;
        if i + EndOfCentralDirectory::SIZE + eocd.comment_len as usize == data.len() {
            return Ok((eocd, i));
        }
    }

    bail!("Not a valid ZIP file")
}

fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ZipEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    // version made by, version needed, flags
    cursor.set_position(cursor.position() + 6);
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    // modification time and date
    cursor.set_position(cursor.position() + 4);
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let name_len = cursor.read_u16::<LittleEndian>()?;
    let extra_len = cursor.read_u16::<LittleEndian>()?;
    let comment_len = cursor.read_u16::<LittleEndian>()?;
    // disk number start, internal and external attributes
    cursor.set_position(cursor.position() + 8);
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut name = vec![0u8; name_len as usize];
    cursor.read_exact(&mut name)?;
    let file_name = String::from_utf8_lossy(&name).into_owned();

    let extra_end = cursor.position() + extra_len as u64;
    while cursor.position() + 4 <= extra_end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()? as u64;
        let field_end = cursor.position() + field_size;

        // ZIP64 extended information: values present only for saturated fields
        if header_id == 0x0001 {
            for value in [&mut uncompressed_size, &mut compressed_size, &mut lfh_offset] {
                if *value == 0xFFFF_FFFF && cursor.position() + 8 <= field_end {
                    *value = cursor.read_u64::<LittleEndian>()?;
                }
            }
        }
        cursor.set_position(field_end);
    }
    cursor.set_position(extra_end + comment_len as u64);

    Ok(ZipEntry {
        file_name,
        compression_method: CompressionMethod::from(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        lfh_offset,
    })
}
