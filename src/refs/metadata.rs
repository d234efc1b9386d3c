//! Minimal reader for CLI metadata in .NET assemblies.
//!
//! Reads only what type resolution needs: type definitions with their base
//! type and flags, and method definitions with their flags and parameter
//! counts. Layout follows ECMA-335 partition II (PE file, CLI header, BSJB
//! metadata root, `#~` table stream).

/// Failure to read an assembly.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    /// Valid or unknown binary without a CLI header
    #[error("not a managed assembly: {0}")]
    NotManaged(String),

    /// Structure present but truncated or inconsistent
    #[error("corrupt metadata: {0}")]
    Corrupt(String),
}

type Result<T> = std::result::Result<T, MetadataError>;

pub const TYPE_INTERFACE: u32 = 0x20;
pub const TYPE_ABSTRACT: u32 = 0x80;
pub const TYPE_SEALED: u32 = 0x100;

pub const METHOD_STATIC: u16 = 0x10;
pub const METHOD_VIRTUAL: u16 = 0x40;
pub const METHOD_ABSTRACT: u16 = 0x400;

const TABLE_MODULE: usize = 0x00;
const TABLE_TYPEREF: usize = 0x01;
const TABLE_TYPEDEF: usize = 0x02;
const TABLE_FIELDPTR: usize = 0x03;
const TABLE_FIELD: usize = 0x04;
const TABLE_METHODPTR: usize = 0x05;
const TABLE_METHODDEF: usize = 0x06;
const TABLE_PARAM: usize = 0x08;
const TABLE_MODULEREF: usize = 0x1A;
const TABLE_TYPESPEC: usize = 0x1B;
const TABLE_ASSEMBLYREF: usize = 0x23;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataMethod {
    pub name: String,
    pub flags: u16,
    pub param_count: Option<usize>,
}

impl MetadataMethod {
    pub fn is_static(&self) -> bool {
        self.flags & METHOD_STATIC != 0
    }

    pub fn is_virtual(&self) -> bool {
        self.flags & METHOD_VIRTUAL != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.flags & METHOD_ABSTRACT != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataType {
    pub namespace: String,
    pub name: String,
    pub flags: u32,
    /// Simple name of the base type, when it is a plain type reference
    pub extends: Option<String>,
    pub methods: Vec<MetadataMethod>,
}

impl MetadataType {
    pub fn is_interface(&self) -> bool {
        self.flags & TYPE_INTERFACE != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyMetadata {
    /// Module name without its file extension
    pub assembly: String,
    pub types: Vec<MetadataType>,
}

/// Bounds-checked little-endian reads.
struct Bytes<'a> {
    data: &'a [u8],
}

impl<'a> Bytes<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| MetadataError::Corrupt(format!("read past end at {:#x}", offset)))
    }

    fn u8(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    fn u16(&self, offset: usize) -> Result<u16> {
        let b = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&self, offset: usize) -> Result<u32> {
        let b = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&self, offset: usize) -> Result<u64> {
        let b = self.slice(offset, 8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    /// Read a 2- or 4-byte index.
    fn index(&self, offset: usize, size: usize) -> Result<u32> {
        if size == 2 {
            self.u16(offset).map(u32::from)
        } else {
            self.u32(offset)
        }
    }
}

/// Read types and methods from an assembly file's bytes.
pub fn read_assembly(bytes: &[u8]) -> Result<AssemblyMetadata> {
    let md = locate_metadata(bytes)?;
    parse_metadata(md)
}

/// Find the metadata root inside a PE image.
pub fn locate_metadata(bytes: &[u8]) -> Result<&[u8]> {
    let b = Bytes::new(bytes);
    if bytes.len() < 0x40 || &bytes[..2] != b"MZ" {
        return Err(MetadataError::NotManaged("missing MZ header".into()));
    }
    let pe = b.u32(0x3C)? as usize;
    if b.slice(pe, 4)? != b"PE\0\0" {
        return Err(MetadataError::NotManaged("missing PE signature".into()));
    }
    let coff = pe + 4;
    let section_count = b.u16(coff + 2)? as usize;
    let optional_size = b.u16(coff + 16)? as usize;
    let optional = coff + 20;
    let (dir_count_offset, dirs_offset) = match b.u16(optional)? {
        0x10b => (92, 96),
        0x20b => (108, 112),
        other => {
            return Err(MetadataError::NotManaged(format!(
                "unknown optional header magic {:#x}",
                other
            )))
        }
    };
    let dir_count = b.u32(optional + dir_count_offset)? as usize;
    if dir_count <= 14 {
        return Err(MetadataError::NotManaged("no CLI header directory".into()));
    }
    let cli_rva = b.u32(optional + dirs_offset + 14 * 8)?;
    if cli_rva == 0 {
        return Err(MetadataError::NotManaged("empty CLI header directory".into()));
    }

    let sections_offset = optional + optional_size;
    let rva_to_offset = |rva: u32| -> Result<usize> {
        for i in 0..section_count {
            let s = sections_offset + i * 40;
            let virtual_size = b.u32(s + 8)?;
            let virtual_address = b.u32(s + 12)?;
            let raw_size = b.u32(s + 16)?;
            let raw_pointer = b.u32(s + 20)?;
            let extent = virtual_size.max(raw_size);
            if rva >= virtual_address && rva < virtual_address.saturating_add(extent) {
                return (rva - virtual_address)
                    .checked_add(raw_pointer)
                    .map(|offset| offset as usize)
                    .ok_or_else(|| {
                        MetadataError::Corrupt(format!(
                            "section raw pointer {:#x} overflows for RVA {:#x}",
                            raw_pointer, rva
                        ))
                    });
            }
        }
        Err(MetadataError::Corrupt(format!("RVA {:#x} outside all sections", rva)))
    };

    let cli = rva_to_offset(cli_rva)?;
    let md_rva = b.u32(cli + 8)?;
    let md_size = b.u32(cli + 12)? as usize;
    let md_offset = rva_to_offset(md_rva)?;
    b.slice(md_offset, md_size)
}

struct Streams<'a> {
    tables: &'a [u8],
    strings: &'a [u8],
    blob: &'a [u8],
}

fn read_streams(md: &[u8]) -> Result<Streams<'_>> {
    let b = Bytes::new(md);
    if b.u32(0)? != 0x424A_5342 {
        return Err(MetadataError::Corrupt("missing BSJB signature".into()));
    }
    let version_len = b.u32(12)? as usize;
    let mut pos = 16 + version_len;
    let stream_count = b.u16(pos + 2)? as usize;
    pos += 4;

    let mut tables = None;
    let mut strings: &[u8] = &[];
    let mut blob: &[u8] = &[];
    for _ in 0..stream_count {
        let offset = b.u32(pos)? as usize;
        let size = b.u32(pos + 4)? as usize;
        let name_start = pos + 8;
        let name_len = md
            .get(name_start..)
            .and_then(|rest| rest.iter().position(|&c| c == 0))
            .ok_or_else(|| MetadataError::Corrupt("unterminated stream name".into()))?;
        let name = &md[name_start..name_start + name_len];
        // Name plus terminator, padded to four bytes
        pos = name_start + ((name_len + 4) & !3);
        let data = b.slice(offset, size)?;
        match name {
            b"#~" | b"#-" => tables = Some(data),
            b"#Strings" => strings = data,
            b"#Blob" => blob = data,
            _ => {}
        }
    }
    let tables = tables.ok_or_else(|| MetadataError::Corrupt("no table stream".into()))?;
    Ok(Streams {
        tables,
        strings,
        blob,
    })
}

fn heap_string(heap: &[u8], index: u32) -> String {
    let start = index as usize;
    let Some(rest) = heap.get(start..) else {
        return String::new();
    };
    let end = rest.iter().position(|&c| c == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

/// Compressed unsigned integer (II.23.2) at `pos`: value and encoded length.
fn compressed_u32(data: &[u8], pos: usize) -> Option<(u32, usize)> {
    let first = *data.get(pos)?;
    if first & 0x80 == 0 {
        Some((u32::from(first), 1))
    } else if first & 0xC0 == 0x80 {
        let second = *data.get(pos + 1)?;
        Some(((u32::from(first & 0x3F) << 8) | u32::from(second), 2))
    } else if first & 0xE0 == 0xC0 {
        let bytes = data.get(pos + 1..pos + 4)?;
        Some((
            (u32::from(first & 0x1F) << 24)
                | (u32::from(bytes[0]) << 16)
                | (u32::from(bytes[1]) << 8)
                | u32::from(bytes[2]),
            4,
        ))
    } else {
        None
    }
}

/// Parameter count from a MethodDefSig blob.
fn signature_param_count(blob: &[u8], index: u32) -> Option<usize> {
    let (len, header) = compressed_u32(blob, index as usize)?;
    let start = index as usize + header;
    let sig = blob.get(start..start + len as usize)?;
    let calling_convention = *sig.first()?;
    let mut pos = 1;
    if calling_convention & 0x10 != 0 {
        let (_, n) = compressed_u32(sig, pos)?;
        pos += n;
    }
    compressed_u32(sig, pos).map(|(count, _)| count as usize)
}

struct TableLayout {
    rows: [u32; 64],
    string_size: usize,
    guid_size: usize,
    blob_size: usize,
}

impl TableLayout {
    fn index_size(&self, table: usize) -> usize {
        if self.rows[table] < 0x1_0000 {
            2
        } else {
            4
        }
    }

    fn coded_size(&self, tables: &[usize], tag_bits: u32) -> usize {
        let max = tables.iter().map(|&t| self.rows[t]).max().unwrap_or(0);
        if max < (1u32 << (16 - tag_bits)) {
            2
        } else {
            4
        }
    }

    fn resolution_scope(&self) -> usize {
        self.coded_size(
            &[TABLE_MODULE, TABLE_MODULEREF, TABLE_ASSEMBLYREF, TABLE_TYPEREF],
            2,
        )
    }

    fn type_def_or_ref(&self) -> usize {
        self.coded_size(&[TABLE_TYPEDEF, TABLE_TYPEREF, TABLE_TYPESPEC], 2)
    }

    fn row_size(&self, table: usize) -> usize {
        let (s, g, bl) = (self.string_size, self.guid_size, self.blob_size);
        match table {
            TABLE_MODULE => 2 + s + 3 * g,
            TABLE_TYPEREF => self.resolution_scope() + 2 * s,
            TABLE_TYPEDEF => {
                4 + 2 * s
                    + self.type_def_or_ref()
                    + self.index_size(TABLE_FIELD)
                    + self.index_size(TABLE_METHODDEF)
            }
            TABLE_FIELDPTR => self.index_size(TABLE_FIELD),
            TABLE_FIELD => 2 + s + bl,
            TABLE_METHODPTR => self.index_size(TABLE_METHODDEF),
            TABLE_METHODDEF => 4 + 2 + 2 + s + bl + self.index_size(TABLE_PARAM),
            _ => 0,
        }
    }
}

/// Parse the metadata root located by [`locate_metadata`].
pub fn parse_metadata(md: &[u8]) -> Result<AssemblyMetadata> {
    let streams = read_streams(md)?;
    let t = Bytes::new(streams.tables);
    let heap_sizes = t.u8(6)?;
    let valid = t.u64(8)?;

    let mut layout = TableLayout {
        rows: [0; 64],
        string_size: if heap_sizes & 0x01 != 0 { 4 } else { 2 },
        guid_size: if heap_sizes & 0x02 != 0 { 4 } else { 2 },
        blob_size: if heap_sizes & 0x04 != 0 { 4 } else { 2 },
    };
    let mut pos = 24;
    for table in 0..64 {
        if valid & (1u64 << table) != 0 {
            layout.rows[table] = t.u32(pos)?;
            pos += 4;
        }
    }
    if heap_sizes & 0x40 != 0 {
        pos += 4;
    }

    // Tables are stored in id order; only the first seven are read
    let mut table_start = [0usize; TABLE_METHODDEF + 1];
    for (table, start) in table_start.iter_mut().enumerate() {
        *start = pos;
        pos += layout.rows[table] as usize * layout.row_size(table);
    }
    if pos > streams.tables.len() {
        return Err(MetadataError::Corrupt("table stream shorter than its rows".into()));
    }

    let s = layout.string_size;
    let string_at = |offset: usize| -> Result<String> {
        Ok(heap_string(streams.strings, t.index(offset, s)?))
    };

    let assembly = if layout.rows[TABLE_MODULE] > 0 {
        let name = string_at(table_start[TABLE_MODULE] + 2)?;
        name.strip_suffix(".dll")
            .or_else(|| name.strip_suffix(".exe"))
            .unwrap_or(&name)
            .to_string()
    } else {
        String::new()
    };

    let typeref_size = layout.row_size(TABLE_TYPEREF);
    let typeref_name = |row: u32| -> Result<String> {
        let offset = table_start[TABLE_TYPEREF]
            + (row as usize - 1) * typeref_size
            + layout.resolution_scope();
        string_at(offset)
    };

    // Method rows, honoring the MethodPtr indirection of unoptimized streams
    let method_size = layout.row_size(TABLE_METHODDEF);
    let method_count = layout.rows[TABLE_METHODDEF];
    let method_row = |logical: u32| -> Result<u32> {
        if layout.rows[TABLE_METHODPTR] == 0 {
            return Ok(logical);
        }
        let offset = table_start[TABLE_METHODPTR]
            + (logical as usize - 1) * layout.row_size(TABLE_METHODPTR);
        t.index(offset, layout.index_size(TABLE_METHODDEF))
    };
    let read_method = |row: u32| -> Result<MetadataMethod> {
        let offset = table_start[TABLE_METHODDEF] + (row as usize - 1) * method_size;
        let flags = t.u16(offset + 6)?;
        let name = string_at(offset + 8)?;
        let sig = t.index(offset + 8 + s, layout.blob_size)?;
        Ok(MetadataMethod {
            name,
            flags,
            param_count: signature_param_count(streams.blob, sig),
        })
    };

    let typedef_size = layout.row_size(TABLE_TYPEDEF);
    let tdr = layout.type_def_or_ref();
    let field_index = layout.index_size(TABLE_FIELD);
    let method_index = layout.index_size(TABLE_METHODDEF);
    let type_count = layout.rows[TABLE_TYPEDEF];
    let list_start = |row: u32| -> Result<u32> {
        let offset = table_start[TABLE_TYPEDEF]
            + (row as usize - 1) * typedef_size
            + 4
            + 2 * s
            + tdr
            + field_index;
        t.index(offset, method_index)
    };

    let mut names = Vec::with_capacity(type_count as usize);
    for row in 1..=type_count {
        let offset = table_start[TABLE_TYPEDEF] + (row as usize - 1) * typedef_size;
        names.push(string_at(offset + 4)?);
    }

    let mut types = Vec::new();
    for row in 1..=type_count {
        let offset = table_start[TABLE_TYPEDEF] + (row as usize - 1) * typedef_size;
        let flags = t.u32(offset)?;
        let name = names[row as usize - 1].clone();
        let namespace = string_at(offset + 4 + s)?;
        let extends_raw = t.index(offset + 4 + 2 * s, tdr)?;
        let extends = match (extends_raw & 0b11, extends_raw >> 2) {
            (_, 0) => None,
            (0, r) => names.get(r as usize - 1).cloned(),
            (1, r) if r <= layout.rows[TABLE_TYPEREF] => Some(typeref_name(r)?),
            _ => None,
        };

        let first = list_start(row)?;
        let last = if row < type_count {
            list_start(row + 1)?
        } else {
            method_count + 1
        };
        let mut methods = Vec::new();
        for logical in first..last.min(method_count + 1) {
            if logical == 0 {
                continue;
            }
            let physical = method_row(logical)?;
            if physical == 0 || physical > method_count {
                return Err(MetadataError::Corrupt(format!(
                    "method index {} out of range",
                    physical
                )));
            }
            methods.push(read_method(physical)?);
        }

        // `<Module>` and compiler-generated types carry no resolvable members
        if name.starts_with('<') {
            continue;
        }
        types.push(MetadataType {
            namespace,
            name,
            flags,
            extends,
            methods,
        });
    }

    Ok(AssemblyMetadata { assembly, types })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a metadata root with Module, TypeRef, TypeDef and MethodDef rows.
    ///
    /// `types` is `(namespace, name, flags, extends_typeref, methods)` where
    /// methods are `(name, flags, param_count)`.
    pub(crate) fn build_metadata(
        module: &str,
        typerefs: &[&str],
        types: &[(&str, &str, u32, Option<usize>, Vec<(&str, u16, u8)>)],
    ) -> Vec<u8> {
        let mut strings = vec![0u8];
        let mut intern = |s: &str| -> u16 {
            let at = strings.len() as u16;
            strings.extend_from_slice(s.as_bytes());
            strings.push(0);
            at
        };
        let mut blob = vec![0u8];

        let module_name = intern(module);
        let typeref_names: Vec<u16> = typerefs.iter().map(|n| intern(n)).collect();
        let mut typedef_rows = Vec::new();
        let mut method_rows = Vec::new();
        for (ns, name, flags, extends, methods) in types {
            let ns_idx = intern(ns);
            let name_idx = intern(name);
            typedef_rows.push((*flags, name_idx, ns_idx, *extends, method_rows.len() as u16 + 1));
            for (mname, mflags, params) in methods {
                let midx = intern(mname);
                let sig_at = blob.len() as u16;
                blob.extend_from_slice(&[3, 0x20, *params, 0x01]);
                method_rows.push((midx, *mflags, sig_at));
            }
        }

        let mut tables = Vec::new();
        tables.extend_from_slice(&0u32.to_le_bytes());
        tables.extend_from_slice(&[2, 0, 0, 1]);
        let valid: u64 = (1 << TABLE_MODULE)
            | (1 << TABLE_TYPEREF)
            | (1 << TABLE_TYPEDEF)
            | (1 << TABLE_METHODDEF);
        tables.extend_from_slice(&valid.to_le_bytes());
        tables.extend_from_slice(&0u64.to_le_bytes());
        tables.extend_from_slice(&1u32.to_le_bytes());
        tables.extend_from_slice(&(typerefs.len() as u32).to_le_bytes());
        tables.extend_from_slice(&(typedef_rows.len() as u32).to_le_bytes());
        tables.extend_from_slice(&(method_rows.len() as u32).to_le_bytes());
        // Module: generation, name, mvid, encid, encbaseid
        tables.extend_from_slice(&0u16.to_le_bytes());
        tables.extend_from_slice(&module_name.to_le_bytes());
        tables.extend_from_slice(&[0u8; 6]);
        for name in &typeref_names {
            tables.extend_from_slice(&0u16.to_le_bytes());
            tables.extend_from_slice(&name.to_le_bytes());
            tables.extend_from_slice(&0u16.to_le_bytes());
        }
        for (flags, name, ns, extends, method_list) in &typedef_rows {
            tables.extend_from_slice(&flags.to_le_bytes());
            tables.extend_from_slice(&name.to_le_bytes());
            tables.extend_from_slice(&ns.to_le_bytes());
            let coded: u16 = extends.map(|r| ((r as u16) << 2) | 1).unwrap_or(0);
            tables.extend_from_slice(&coded.to_le_bytes());
            tables.extend_from_slice(&1u16.to_le_bytes());
            tables.extend_from_slice(&method_list.to_le_bytes());
        }
        for (name, flags, sig) in &method_rows {
            tables.extend_from_slice(&0u32.to_le_bytes());
            tables.extend_from_slice(&0u16.to_le_bytes());
            tables.extend_from_slice(&flags.to_le_bytes());
            tables.extend_from_slice(&name.to_le_bytes());
            tables.extend_from_slice(&sig.to_le_bytes());
            tables.extend_from_slice(&1u16.to_le_bytes());
        }
        for heap in [&mut tables, &mut strings, &mut blob] {
            while heap.len() % 4 != 0 {
                heap.push(0);
            }
        }

        let version = b"v4.0.30319\0\0";
        let header_len = 16 + version.len() + 4 + (8 + 4) + (8 + 12) + (8 + 8);
        let mut md = Vec::new();
        md.extend_from_slice(&0x424A_5342u32.to_le_bytes());
        md.extend_from_slice(&1u16.to_le_bytes());
        md.extend_from_slice(&1u16.to_le_bytes());
        md.extend_from_slice(&0u32.to_le_bytes());
        md.extend_from_slice(&(version.len() as u32).to_le_bytes());
        md.extend_from_slice(version);
        md.extend_from_slice(&0u16.to_le_bytes());
        md.extend_from_slice(&3u16.to_le_bytes());
        let tables_at = header_len;
        let strings_at = tables_at + tables.len();
        let blob_at = strings_at + strings.len();
        for (at, len, name) in [
            (tables_at, tables.len(), &b"#~\0\0"[..]),
            (strings_at, strings.len(), &b"#Strings\0\0\0\0"[..]),
            (blob_at, blob.len(), &b"#Blob\0\0\0"[..]),
        ] {
            md.extend_from_slice(&(at as u32).to_le_bytes());
            md.extend_from_slice(&(len as u32).to_le_bytes());
            md.extend_from_slice(name);
        }
        assert_eq!(md.len(), header_len);
        md.extend_from_slice(&tables);
        md.extend_from_slice(&strings);
        md.extend_from_slice(&blob);
        md
    }

    /// Wraps metadata in a minimal PE32 image with one section.
    pub(crate) fn build_pe(md: &[u8]) -> Vec<u8> {
        let mut pe = vec![0u8; 0x80];
        pe[0] = b'M';
        pe[1] = b'Z';
        pe[0x3C..0x40].copy_from_slice(&0x80u32.to_le_bytes());
        pe.extend_from_slice(b"PE\0\0");
        let optional_size: u16 = 224;
        let mut coff = vec![0u8; 20];
        coff[2..4].copy_from_slice(&1u16.to_le_bytes());
        coff[16..18].copy_from_slice(&optional_size.to_le_bytes());
        pe.extend_from_slice(&coff);
        let mut optional = vec![0u8; optional_size as usize];
        optional[0..2].copy_from_slice(&0x10bu16.to_le_bytes());
        optional[92..96].copy_from_slice(&16u32.to_le_bytes());
        let section_rva: u32 = 0x2000;
        let cli_rva = section_rva;
        optional[96 + 14 * 8..96 + 14 * 8 + 4].copy_from_slice(&cli_rva.to_le_bytes());
        optional[96 + 14 * 8 + 4..96 + 14 * 8 + 8].copy_from_slice(&72u32.to_le_bytes());
        pe.extend_from_slice(&optional);

        let raw_pointer = (pe.len() + 40 + 0x1FF) & !0x1FF;
        let mut body = vec![0u8; 72];
        body[0..4].copy_from_slice(&72u32.to_le_bytes());
        body[8..12].copy_from_slice(&(section_rva + 72).to_le_bytes());
        body[12..16].copy_from_slice(&(md.len() as u32).to_le_bytes());
        body.extend_from_slice(md);

        let mut section = vec![0u8; 40];
        section[0..6].copy_from_slice(b".text\0");
        section[8..12].copy_from_slice(&(body.len() as u32).to_le_bytes());
        section[12..16].copy_from_slice(&section_rva.to_le_bytes());
        section[16..20].copy_from_slice(&(body.len() as u32).to_le_bytes());
        section[20..24].copy_from_slice(&(raw_pointer as u32).to_le_bytes());
        pe.extend_from_slice(&section);
        pe.resize(raw_pointer, 0);
        pe.extend_from_slice(&body);
        pe
    }

    fn sample() -> Vec<u8> {
        build_metadata(
            "UnityEngine.CoreModule.dll",
            &["Object"],
            &[
                ("UnityEngine", "Component", 0x1, Some(1), vec![
                    ("GetComponent", 0x6, 0),
                    ("SendMessage", 0x46, 1),
                ]),
                ("UnityEngine", "Debug", 0x181, None, vec![("Log", 0x16, 1)]),
                ("UnityEngine", "IHandler", 0xA1, None, vec![("Handle", 0x5C6, 2)]),
            ],
        )
    }

    #[test]
    fn test_parse_metadata_types_and_methods() {
        let meta = parse_metadata(&sample()).unwrap();
        assert_eq!(meta.assembly, "UnityEngine.CoreModule");
        assert_eq!(meta.types.len(), 3);

        let component = &meta.types[0];
        assert_eq!(component.name, "Component");
        assert_eq!(component.namespace, "UnityEngine");
        assert_eq!(component.extends.as_deref(), Some("Object"));
        assert_eq!(component.methods.len(), 2);
        assert!(component.methods[1].is_virtual());
        assert_eq!(component.methods[1].param_count, Some(1));

        let debug = &meta.types[1];
        assert!(debug.methods[0].is_static());
        assert!(meta.types[2].is_interface());
        assert!(meta.types[2].methods[0].is_abstract());
    }

    #[test]
    fn test_read_assembly_through_pe_headers() {
        let pe = build_pe(&sample());
        let meta = read_assembly(&pe).unwrap();
        assert_eq!(meta.types[1].name, "Debug");
    }

    #[test]
    fn test_non_pe_and_truncated_inputs() {
        assert!(matches!(
            read_assembly(b"not a binary at all, just some text padding it out to be long enough"),
            Err(MetadataError::NotManaged(_))
        ));
        let md = sample();
        assert!(matches!(
            parse_metadata(&md[..md.len() / 3]),
            Err(MetadataError::Corrupt(_))
        ));
    }

    #[test]
    fn test_section_raw_pointer_overflow_is_corrupt() {
        let mut pe = build_pe(&sample());
        let optional = 0x80 + 4 + 20;
        let cli_dir = optional + 96 + 14 * 8;
        pe[cli_dir..cli_dir + 4].copy_from_slice(&0x2010u32.to_le_bytes());
        let raw_pointer = optional + 224 + 20;
        pe[raw_pointer..raw_pointer + 4].copy_from_slice(&0xFFFF_FFF8u32.to_le_bytes());
        assert!(matches!(locate_metadata(&pe), Err(MetadataError::Corrupt(_))));
    }

    #[test]
    fn test_compressed_integers() {
        assert_eq!(compressed_u32(&[0x03], 0), Some((3, 1)));
        assert_eq!(compressed_u32(&[0x80, 0x80], 0), Some((0x80, 2)));
        assert_eq!(compressed_u32(&[0xC0, 0x00, 0x40, 0x00], 0), Some((0x4000, 4)));
        assert_eq!(compressed_u32(&[0xFF], 0), None);
    }
}
