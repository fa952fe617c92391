//! Serialized filesystem image
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! header   magic "RBWVFS01" | entry_count: u32 | data_offset: u64
//! entries  kind: u8 (0 = dir, 1 = file) | path_len: u32 | path (UTF-8)
//!          files only: offset: u64 | len: u64   (relative to data_offset)
//! data     file contents concatenated in entry order
//! ```
//!
//! Paths are absolute guest paths. The root directory is implicit and never
//! listed.

use crate::error::{RbwasmError, RbwasmResult};

/// Image magic and format version
pub const MAGIC: &[u8; 8] = b"RBWVFS01";

const HEADER_LEN: usize = 8 + 4 + 8;

/// Kind of an image entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Dir,
    File,
}

impl NodeKind {
    fn tag(self) -> u8 {
        match self {
            Self::Dir => 0,
            Self::File => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Dir),
            1 => Some(Self::File),
            _ => None,
        }
    }
}

/// One row of the entry table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsEntry {
    pub kind: NodeKind,
    /// Absolute guest path
    pub path: String,
    /// Byte offset into the data section (files only)
    pub offset: u64,
    /// Byte length (files only)
    pub len: u64,
}

impl VfsEntry {
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Dir,
            path: path.into(),
            offset: 0,
            len: 0,
        }
    }

    pub fn file(path: impl Into<String>, offset: u64, len: u64) -> Self {
        Self {
            kind: NodeKind::File,
            path: path.into(),
            offset,
            len,
        }
    }

    fn encoded_len(&self) -> usize {
        let fixed = 1 + 4 + self.path.len();
        match self.kind {
            NodeKind::Dir => fixed,
            NodeKind::File => fixed + 16,
        }
    }
}

/// Self-describing filesystem image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VfsImage {
    entries: Vec<VfsEntry>,
    data: Vec<u8>,
}

impl VfsImage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a directory entry
    pub fn push_dir(&mut self, path: impl Into<String>) {
        self.entries.push(VfsEntry::dir(path));
    }

    /// Append a file entry, its content going to the end of the data section
    pub fn push_file(&mut self, path: impl Into<String>, content: &[u8]) {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(content);
        self.entries
            .push(VfsEntry::file(path, offset, content.len() as u64));
    }

    pub fn entries(&self) -> &[VfsEntry] {
        &self.entries
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn file_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.kind == NodeKind::File)
            .count()
    }

    /// Content of the file at `path`
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| e.kind == NodeKind::File && e.path == path)
            .map(|e| &self.data[e.offset as usize..(e.offset + e.len) as usize])
    }

    /// Serialize to the binary layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let table_len: usize = self.entries.iter().map(VfsEntry::encoded_len).sum();
        let data_offset = HEADER_LEN + table_len;

        let mut out = Vec::with_capacity(data_offset + self.data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data_offset as u64).to_le_bytes());
        for entry in &self.entries {
            out.push(entry.kind.tag());
            out.extend_from_slice(&(entry.path.len() as u32).to_le_bytes());
            out.extend_from_slice(entry.path.as_bytes());
            if entry.kind == NodeKind::File {
                out.extend_from_slice(&entry.offset.to_le_bytes());
                out.extend_from_slice(&entry.len.to_le_bytes());
            }
        }
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse the binary layout
    pub fn parse(bytes: &[u8]) -> RbwasmResult<Self> {
        let mut r = Reader { bytes, pos: 0 };
        if r.take(8)? != MAGIC {
            return Err(malformed("bad magic"));
        }
        let count = r.u32()? as usize;
        let data_offset = r.u64()? as usize;

        let mut entries = Vec::with_capacity(count.min(bytes.len()));
        for _ in 0..count {
            let kind = NodeKind::from_tag(r.take(1)?[0]).ok_or_else(|| malformed("bad entry kind"))?;
            let path_len = r.u32()? as usize;
            let path = std::str::from_utf8(r.take(path_len)?)
                .map_err(|_| malformed("entry path is not UTF-8"))?
                .to_string();
            let entry = match kind {
                NodeKind::Dir => VfsEntry::dir(path),
                NodeKind::File => VfsEntry::file(path, r.u64()?, r.u64()?),
            };
            entries.push(entry);
        }
        if r.pos != data_offset || data_offset > bytes.len() {
            return Err(malformed("data offset does not follow the entry table"));
        }

        let data = bytes[data_offset..].to_vec();
        for e in &entries {
            if e.kind == NodeKind::File && e.offset.saturating_add(e.len) > data.len() as u64 {
                return Err(malformed("file range outside the data section"));
            }
        }
        Ok(Self { entries, data })
    }
}

fn malformed(reason: &str) -> RbwasmError {
    RbwasmError::vfs("<image>", format!("malformed image: {}", reason))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> RbwasmResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| malformed("truncated"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> RbwasmResult<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> RbwasmResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VfsImage {
        let mut image = VfsImage::new();
        image.push_dir("/lib");
        image.push_file("/lib/a.txt", b"hi");
        image.push_dir("/lib/sub");
        image.push_file("/lib/sub/b.txt", b"yo");
        image
    }

    #[test]
    fn layout_is_exact() {
        let bytes = sample().to_bytes();

        assert_eq!(&bytes[..8], b"RBWVFS01");
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 4);
        let data_offset = u64::from_le_bytes(bytes[12..20].try_into().unwrap()) as usize;
        // 20 header + dirs (5+4, 5+8) + files (5+10+16, 5+14+16)
        assert_eq!(data_offset, 20 + 9 + 13 + 31 + 35);
        assert_eq!(&bytes[data_offset..], b"hiyo");
        // first entry: dir "/lib"
        assert_eq!(bytes[20], 0);
        assert_eq!(u32::from_le_bytes(bytes[21..25].try_into().unwrap()), 4);
        assert_eq!(&bytes[25..29], b"/lib");
    }

    #[test]
    fn parse_reads_back_entries() {
        let image = sample();
        let parsed = VfsImage::parse(&image.to_bytes()).unwrap();

        assert_eq!(parsed, image);
        assert_eq!(parsed.file("/lib/sub/b.txt"), Some(&b"yo"[..]));
        assert_eq!(parsed.file("/lib/sub"), None);
        assert_eq!(parsed.file_count(), 2);
    }

    #[test]
    fn parse_rejects_corruption() {
        let bytes = sample().to_bytes();
        assert!(VfsImage::parse(&bytes[..bytes.len() - 20]).is_err());
        assert!(VfsImage::parse(b"NOTVFS00").is_err());

        let mut bad_kind = bytes.clone();
        bad_kind[20] = 7;
        assert!(VfsImage::parse(&bad_kind).is_err());
    }

    #[test]
    fn empty_image() {
        let bytes = VfsImage::new().to_bytes();
        assert_eq!(bytes.len(), 20);
        assert!(VfsImage::parse(&bytes).unwrap().entries().is_empty());
    }
}
