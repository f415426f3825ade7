//! Read-only boot-image filesystem
//!
//! The image is one flat byte range handed over by the boot loader as the
//! first Multiboot module. Block 0 is the boot block: three counts, 52
//! reserved bytes, then up to 63 directory entries of 64 bytes each
//! (32-byte name, file type, inode index). Inode blocks follow the boot
//! block (a length plus up to 1023 data-block indices) and the data
//! blocks come after the inodes. Everything is 4 KB aligned.
//!
//! Names are at most 32 bytes and are not NUL-terminated at full length.

use spin::Mutex;

pub const BLOCK_SIZE: usize = 4096;
pub const FILENAME_CAPACITY: usize = 32;

const DENTRY_SIZE: usize = 64;
const MAX_DENTRIES: usize = 63;
const INODE_INDEX_CAPACITY: usize = BLOCK_SIZE / 4 - 1;

/// File types as stored in directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Rtc,
    Directory,
    Regular,
}

impl FileType {
    fn from_raw(raw: u32) -> Result<Self, &'static str> {
        match raw {
            0 => Ok(FileType::Rtc),
            1 => Ok(FileType::Directory),
            2 => Ok(FileType::Regular),
            _ => Err("unknown file type in directory entry"),
        }
    }
}

/// A parsed directory entry.
#[derive(Debug, Clone, Copy)]
pub struct Dentry {
    name: [u8; FILENAME_CAPACITY],
    name_len: usize,
    pub file_type: FileType,
    pub inode: u32,
}

impl Dentry {
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }
}

static IMAGE: Mutex<Option<&'static [u8]>> = Mutex::new(None);

/// Install the filesystem image. Replaces any previous image; the boot
/// path calls this once with the Multiboot module.
pub fn install(image: &'static [u8]) -> Result<(), &'static str> {
    if image.len() < BLOCK_SIZE {
        return Err("filesystem image smaller than a boot block");
    }
    let dentries = read_u32(image, 0)?;
    let inodes = read_u32(image, 4)?;
    let data_blocks = read_u32(image, 8)?;
    let needed = (1 + inodes as usize + data_blocks as usize) * BLOCK_SIZE;
    if image.len() < needed {
        return Err("filesystem image truncated");
    }
    if dentries as usize > MAX_DENTRIES {
        return Err("boot block claims too many directory entries");
    }

    *IMAGE.lock() = Some(image);
    log::info!(
        "filesystem: {} entries, {} inodes, {} data blocks",
        dentries,
        inodes,
        data_blocks
    );
    Ok(())
}

fn image() -> Result<&'static [u8], &'static str> {
    (*IMAGE.lock()).ok_or("no filesystem image installed")
}

fn read_u32(image: &[u8], offset: usize) -> Result<u32, &'static str> {
    let bytes = image
        .get(offset..offset + 4)
        .ok_or("read past end of filesystem image")?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Number of directory entries in the image.
pub fn dentry_count() -> Result<usize, &'static str> {
    let image = image()?;
    Ok(read_u32(image, 0)? as usize)
}

fn parse_dentry(image: &'static [u8], index: usize) -> Result<Dentry, &'static str> {
    let offset = DENTRY_SIZE * (index + 1);
    let raw = image
        .get(offset..offset + DENTRY_SIZE)
        .ok_or("directory entry outside the boot block")?;

    let mut name = [0u8; FILENAME_CAPACITY];
    name.copy_from_slice(&raw[..FILENAME_CAPACITY]);
    let name_len = name
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(FILENAME_CAPACITY);

    Ok(Dentry {
        name,
        name_len,
        file_type: FileType::from_raw(read_u32(raw, FILENAME_CAPACITY)?)?,
        inode: read_u32(raw, FILENAME_CAPACITY + 4)?,
    })
}

/// Look a file up by name.
pub fn read_dentry_by_name(name: &[u8]) -> Result<Dentry, &'static str> {
    if name.is_empty() || name.len() > FILENAME_CAPACITY {
        return Err("no such file");
    }
    let image = image()?;
    let count = read_u32(image, 0)? as usize;
    for index in 0..count.min(MAX_DENTRIES) {
        let dentry = parse_dentry(image, index)?;
        if dentry.name() == name {
            return Ok(dentry);
        }
    }
    Err("no such file")
}

/// Look a file up by directory position.
pub fn read_dentry_by_index(index: usize) -> Result<Dentry, &'static str> {
    let image = image()?;
    let count = read_u32(image, 0)? as usize;
    if index >= count.min(MAX_DENTRIES) {
        return Err("directory index out of range");
    }
    parse_dentry(image, index)
}

/// Length in bytes of the file behind `inode`.
pub fn file_size(inode: u32) -> Result<usize, &'static str> {
    let image = image()?;
    let inode_count = read_u32(image, 4)?;
    if inode >= inode_count {
        return Err("inode index out of range");
    }
    let inode_offset = BLOCK_SIZE * (1 + inode as usize);
    Ok(read_u32(image, inode_offset)? as usize)
}

/// Copy up to `buf.len()` bytes of the file behind `inode`, starting at
/// byte `offset`. Returns the bytes copied; reads at or past end of file
/// return 0.
pub fn read_data(inode: u32, offset: usize, buf: &mut [u8]) -> Result<usize, &'static str> {
    let image = image()?;
    let inode_count = read_u32(image, 4)? as usize;
    if inode as usize >= inode_count {
        return Err("inode index out of range");
    }

    let inode_offset = BLOCK_SIZE * (1 + inode as usize);
    let length = read_u32(image, inode_offset)? as usize;
    if offset >= length {
        return Ok(0);
    }
    let to_copy = buf.len().min(length - offset);
    let data_base = BLOCK_SIZE * (1 + inode_count);

    let mut copied = 0;
    while copied < to_copy {
        let file_pos = offset + copied;
        let block_slot = file_pos / BLOCK_SIZE;
        if block_slot >= INODE_INDEX_CAPACITY {
            return Err("file spans more blocks than an inode can index");
        }
        let block_index = read_u32(image, inode_offset + 4 + 4 * block_slot)? as usize;
        let block_offset = file_pos % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - block_offset).min(to_copy - copied);

        let src_start = data_base + block_index * BLOCK_SIZE + block_offset;
        let src = image
            .get(src_start..src_start + chunk)
            .ok_or("data block outside the filesystem image")?;
        buf[copied..copied + chunk].copy_from_slice(src);
        copied += chunk;
    }
    Ok(copied)
}

// --- operation-table entry points -------------------------------------

pub fn file_open() -> Result<(), &'static str> {
    Ok(())
}

pub fn file_close() -> Result<(), &'static str> {
    Ok(())
}

pub fn file_read(inode: u32, position: usize, buf: &mut [u8]) -> Result<usize, &'static str> {
    read_data(inode, position, buf)
}

pub fn file_write(_buf: &[u8]) -> Result<usize, &'static str> {
    Err("filesystem is read-only")
}

pub fn dir_open() -> Result<(), &'static str> {
    Ok(())
}

pub fn dir_close() -> Result<(), &'static str> {
    Ok(())
}

/// One directory entry name per call; `position` is the entry index (the
/// descriptor layer advances it by one per read). Past the last entry,
/// reads return 0 bytes.
pub fn dir_read(_inode: u32, position: usize, buf: &mut [u8]) -> Result<usize, &'static str> {
    match read_dentry_by_index(position) {
        Ok(dentry) => {
            let name = dentry.name();
            let len = name.len().min(buf.len());
            buf[..len].copy_from_slice(&name[..len]);
            Ok(len)
        }
        Err(_) => Ok(0),
    }
}

pub fn dir_write(_buf: &[u8]) -> Result<usize, &'static str> {
    Err("filesystem is read-only")
}
