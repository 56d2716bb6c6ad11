use crate::error::{Error, Result};
use crate::format::{ByteOrder, FormatSpec, ParsedSpec};
use crate::sections::AddressTranslator;
use crate::value::{Row, Value};

/// Where a walk stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Stop once the cursor reaches this physical offset.
    End(u64),
    /// Stop after this many rows.
    Count(u64),
}

impl Bound {
    pub fn from_options(end: Option<u64>, count: Option<u64>) -> Result<Self> {
        match (end, count) {
            (Some(end), None) => Ok(Bound::End(end)),
            (None, Some(count)) => Ok(Bound::Count(count)),
            (None, None) => Err(Error::Configuration(
                "You must specify either an end or a count".to_string(),
            )),
            (Some(_), Some(_)) => Err(Error::Configuration(
                "You cannot specify both an end and a count".to_string(),
            )),
        }
    }
}

/// Decodes records out of an image buffer, following pointers through the
/// section table.
#[derive(Debug, Clone, Copy)]
pub struct StructWalker<'a> {
    data: &'a [u8],
    translator: AddressTranslator<'a>,
}

impl<'a> StructWalker<'a> {
    pub fn new(data: &'a [u8], translator: AddressTranslator<'a>) -> Self {
        Self { data, translator }
    }

    /// Decodes every row between `start` and the bound. Exactly one of `end`
    /// and `count` must be given; this is checked before any byte is read.
    pub fn walk(
        &self,
        start: u64,
        end: Option<u64>,
        count: Option<u64>,
        spec: &ParsedSpec,
    ) -> Result<Vec<Row>> {
        let bound = Bound::from_options(end, count)?;
        self.rows(start, bound, spec).collect()
    }

    /// Lazily decodes rows. The iterator yields at most one error and ends
    /// right after it.
    pub fn rows<'s>(&self, start: u64, bound: Bound, spec: &'s ParsedSpec) -> Rows<'s>
    where
        'a: 's,
    {
        if let Some(size) = spec.row_size() {
            log::debug!("Walking {bound:?} from {start:#x}, {size} bytes per row");
        }

        Rows {
            walker: *self,
            spec,
            cursor: start,
            bound,
            produced: 0,
            done: false,
        }
    }

    /// Decodes exactly one record of `fields` at `offset`.
    pub fn decode_one(&self, offset: u64, order: ByteOrder, fields: &[FormatSpec]) -> Result<Row> {
        let mut cursor = offset;
        self.decode_record(&mut cursor, order, fields)
    }

    fn decode_record(
        &self,
        cursor: &mut u64,
        order: ByteOrder,
        fields: &[FormatSpec],
    ) -> Result<Row> {
        let mut values = Vec::with_capacity(fields.len());

        for field in fields {
            match field {
                FormatSpec::StringZ { hex } => {
                    if *hex {
                        return Err(Error::UnsupportedOperation(
                            "Cannot display string as hex".to_string(),
                        ));
                    }
                    values.push(Value::Text(self.read_stringz(cursor)?));
                }
                FormatSpec::Primitive { code, count, hex } => {
                    let size = code.token_size(order, *count).ok_or(Error::OutOfBounds {
                        offset: *cursor,
                        len: u64::MAX,
                        size: self.data.len() as u64,
                    })?;
                    let bytes = self.read(*cursor, size)?;
                    *cursor += size as u64;

                    let Some(value) = code.decode(order, *count, bytes)? else {
                        continue;
                    };

                    if *hex {
                        let rendered = value.to_hex().ok_or_else(|| {
                            Error::UnsupportedOperation(format!("Cannot display '{code}' as hex"))
                        })?;
                        values.push(Value::Hex(rendered));
                    } else {
                        values.push(value);
                    }
                }
                FormatSpec::Pointer(inner) => {
                    let at = *cursor;
                    let address = order.read_u32(self.read(at, 4)?) as u64;
                    *cursor += 4;

                    if address == 0 {
                        log::trace!("Null pointer at {at:#x}");
                        values.push(Value::Null);
                        continue;
                    }

                    let target = self.translator.virtual_to_physical(address)?;
                    log::trace!("Pointer at {at:#x} -> {address:#x} (physical {target:#x})");
                    values.push(Value::Row(self.decode_one(target, order, inner)?));
                }
            }
        }

        Ok(Row(values))
    }

    fn read(&self, offset: u64, len: usize) -> Result<&'a [u8]> {
        let out_of_bounds = || Error::OutOfBounds {
            offset,
            len: len as u64,
            size: self.data.len() as u64,
        };

        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        self.data.get(start..end).ok_or_else(out_of_bounds)
    }

    fn read_stringz(&self, cursor: &mut u64) -> Result<String> {
        let offset = *cursor;
        let size = self.data.len() as u64;
        let tail = usize::try_from(offset)
            .ok()
            .and_then(|start| self.data.get(start..))
            .ok_or(Error::OutOfBounds { offset, len: 1, size })?;

        let Some(len) = tail.iter().position(|&b| b == 0) else {
            return Err(Error::OutOfBounds {
                offset,
                len: tail.len() as u64 + 1,
                size,
            });
        };

        let bytes = &tail[..len];
        if let Some(i) = bytes.iter().position(|b| !b.is_ascii()) {
            return Err(Error::InvalidText {
                offset: offset + i as u64,
                byte: bytes[i],
            });
        }

        *cursor += len as u64 + 1;
        Ok(bytes.iter().map(|&b| b as char).collect())
    }
}

/// Iterator returned by [`StructWalker::rows`].
pub struct Rows<'s> {
    walker: StructWalker<'s>,
    spec: &'s ParsedSpec,
    cursor: u64,
    bound: Bound,
    produced: u64,
    done: bool,
}

impl Rows<'_> {
    /// Offset where the next row would start.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.bound {
            Bound::End(end) if self.cursor >= end => {
                self.done = true;
                return None;
            }
            Bound::Count(count) if self.produced >= count => {
                self.done = true;
                return None;
            }
            _ => {}
        }
        self.produced += 1;

        let start = self.cursor;
        let result = self
            .walker
            .decode_record(&mut self.cursor, self.spec.byte_order, &self.spec.fields);

        if result.is_ok() && self.cursor == start && matches!(self.bound, Bound::End(_)) {
            // A zero-width row would never reach the end offset.
            self.done = true;
            return Some(Err(Error::Configuration(format!(
                "Format {} consumes no bytes; use a count instead of an end",
                self.spec
            ))));
        }

        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::parse;
    use crate::sections::Section;

    const IMAGE_BASE: u64 = 0x400000;

    fn walk_count(data: &[u8], format: &str, count: u64) -> Result<Vec<Row>> {
        let spec = parse(format)?;
        let translator = AddressTranslator::new(IMAGE_BASE, &[]);
        StructWalker::new(data, translator).walk(0, None, Some(count), &spec)
    }

    #[test]
    fn test_string_and_uint() {
        let data = [0x41, 0x42, 0x05, 0x00, 0x00, 0x00];
        let rows = walk_count(&data, "<2sI", 1).unwrap();
        assert_eq!(
            rows,
            vec![Row(vec![Value::Bytes(b"AB".to_vec()), Value::UInt(5)])]
        );
    }

    #[test]
    fn test_stringz_advances_past_terminator() {
        let data = [0x68, 0x69, 0x00, 0x07];
        let spec = parse("<z").unwrap();
        let translator = AddressTranslator::new(IMAGE_BASE, &[]);
        let walker = StructWalker::new(&data, translator);

        let mut rows = walker.rows(0, Bound::Count(1), &spec);
        let row = rows.next().unwrap().unwrap();
        assert_eq!(row, Row(vec![Value::Text("hi".to_string())]));
        assert_eq!(rows.cursor(), 3);
        assert!(rows.next().is_none());
    }

    #[test]
    fn test_hex_rendering() {
        let data = 255u32.to_le_bytes();
        let rows = walk_count(&data, "<&I", 1).unwrap();
        assert_eq!(rows, vec![Row(vec![Value::Hex("0xff".to_string())])]);

        let data = (-16i16).to_be_bytes();
        let rows = walk_count(&data, ">&h", 1).unwrap();
        assert_eq!(rows, vec![Row(vec![Value::Hex("-0x10".to_string())])]);
    }

    #[test]
    fn test_hex_on_string_is_unsupported() {
        let data = [0x68, 0x69, 0x00];
        let err = walk_count(&data, "&z", 1).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));

        let err = walk_count(&data, "&2s", 1).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));

        let err = walk_count(&[0; 4], "<&f", 1).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }

    #[test]
    fn test_pad_contributes_nothing() {
        let data = [0xaa, 0xbb, 0x01, 0x00];
        let rows = walk_count(&data, "<2xH", 1).unwrap();
        assert_eq!(rows, vec![Row(vec![Value::UInt(1)])]);
    }

    #[test]
    fn test_rows_are_contiguous() {
        let data: Vec<u8> = (0u8..24).collect();
        let spec = parse("<HBx").unwrap();
        let row_size = spec.row_size().unwrap() as u64;
        let translator = AddressTranslator::new(IMAGE_BASE, &[]);
        let walker = StructWalker::new(&data, translator);

        let mut rows = walker.rows(0, Bound::Count(5), &spec);
        let decoded: Vec<Row> = rows.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(decoded.len(), 5);
        assert_eq!(rows.cursor(), 5 * row_size);
        assert_eq!(decoded[1], Row(vec![Value::UInt(0x0504), Value::UInt(6)]));
    }

    #[test]
    fn test_end_bound() {
        let data = [1, 0, 2, 0, 3, 0, 4, 0];
        let spec = parse("<H").unwrap();
        let translator = AddressTranslator::new(IMAGE_BASE, &[]);
        let walker = StructWalker::new(&data, translator);

        let rows = walker.walk(2, Some(6), None, &spec).unwrap();
        assert_eq!(
            rows,
            vec![Row(vec![Value::UInt(2)]), Row(vec![Value::UInt(3)])]
        );

        // The last row may run past an end that isn't row-aligned.
        let rows = walker.walk(0, Some(3), None, &spec).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_zero_count_yields_nothing() {
        let rows = walk_count(&[], "<I", 0).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_bound_validation() {
        let spec = parse("<I").unwrap();
        let translator = AddressTranslator::new(IMAGE_BASE, &[]);
        // An empty buffer proves no byte is touched before validation.
        let walker = StructWalker::new(&[], translator);

        let err = walker.walk(0, Some(4), Some(1), &spec).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = walker.walk(0, None, None, &spec).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_zero_width_row_with_end_bound() {
        let spec = parse("0s").unwrap();
        let translator = AddressTranslator::new(IMAGE_BASE, &[]);
        let walker = StructWalker::new(&[0; 4], translator);

        let err = walker.walk(0, Some(4), None, &spec).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_null_pointer_skips_translation() {
        // No sections at all: any translation attempt would fail.
        let data = [0, 0, 0, 0, 0x2a, 0, 0, 0];
        let rows = walk_count(&data, "<*(IIII)I", 1).unwrap();
        assert_eq!(rows, vec![Row(vec![Value::Null, Value::UInt(42)])]);
    }

    #[test]
    fn test_pointer_dereference() {
        let sections = vec![Section::new(0x1000, 0x100, 0x10)];
        let translator = AddressTranslator::new(IMAGE_BASE, &sections);

        let mut data = vec![0u8; 0x40];
        // row 0: pointer to 0x401000 (physical 0x10)
        data[0..4].copy_from_slice(&0x401000u32.to_le_bytes());
        // row 1: pointer to 0x401008 (physical 0x18)
        data[4..8].copy_from_slice(&0x401008u32.to_le_bytes());
        data[0x10..0x13].copy_from_slice(b"ab\0");
        data[0x13..0x17].copy_from_slice(&7u32.to_le_bytes());
        data[0x18..0x1a].copy_from_slice(b"c\0");
        data[0x1a..0x1e].copy_from_slice(&9u32.to_le_bytes());

        let spec = parse("<*(zI)").unwrap();
        let rows = StructWalker::new(&data, translator)
            .walk(0, None, Some(2), &spec)
            .unwrap();

        assert_eq!(
            rows,
            vec![
                Row(vec![Value::Row(Row(vec![
                    Value::Text("ab".to_string()),
                    Value::UInt(7)
                ]))]),
                Row(vec![Value::Row(Row(vec![
                    Value::Text("c".to_string()),
                    Value::UInt(9)
                ]))]),
            ]
        );
        assert_eq!(rows[0].to_string(), "(\"ab\", 7)");
    }

    #[test]
    fn test_pointer_to_pointer() {
        let sections = vec![Section::new(0x1000, 0x100, 0x10)];
        let translator = AddressTranslator::new(IMAGE_BASE, &sections);

        let mut data = vec![0u8; 0x20];
        data[0..4].copy_from_slice(&0x401004u32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&0x401008u32.to_le_bytes());
        data[0x18..0x1c].copy_from_slice(&0xdeadu32.to_le_bytes());

        let spec = parse("<*(*&I)").unwrap();
        let rows = StructWalker::new(&data, translator)
            .walk(0, None, Some(1), &spec)
            .unwrap();
        assert_eq!(rows[0].to_string(), "0xdead");
    }

    #[test]
    fn test_star_before_group_reads_record() {
        let sections = vec![Section::new(0x1000, 0x100, 0x10)];
        let translator = AddressTranslator::new(IMAGE_BASE, &sections);

        // The record at 0x401000 is { u32 *ptr; u32 id; }.
        let mut data = vec![0u8; 0x20];
        data[0..4].copy_from_slice(&0x401000u32.to_le_bytes());
        data[0x10..0x14].copy_from_slice(&0x40100cu32.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&7u32.to_le_bytes());
        data[0x1c..0x20].copy_from_slice(&0xbeefu32.to_le_bytes());

        let spec = parse("<**(I)").unwrap();
        let rows = StructWalker::new(&data, translator)
            .walk(0, None, Some(1), &spec)
            .unwrap();
        assert_eq!(
            rows[0],
            Row(vec![Value::Row(Row(vec![
                Value::Row(Row(vec![Value::UInt(0xbeef)])),
                Value::UInt(7),
            ]))])
        );
    }

    #[test]
    fn test_oversized_token_is_out_of_bounds() {
        let data = [0u8; 8];
        let spec = ParsedSpec {
            byte_order: ByteOrder::Little,
            fields: vec![FormatSpec::Primitive {
                code: crate::format::ScalarCode::U32,
                count: usize::MAX,
                hex: false,
            }],
        };
        let translator = AddressTranslator::new(IMAGE_BASE, &[]);
        let walker = StructWalker::new(&data, translator);

        assert!(matches!(
            walker.walk(0, None, Some(1), &spec),
            Err(Error::OutOfBounds { offset: 0, .. })
        ));
        assert_eq!(spec.row_size(), None);
    }

    #[test]
    fn test_dereference_decodes_exactly_one_record() {
        let sections = vec![Section::new(0x1000, 0x100, 0x10)];
        let translator = AddressTranslator::new(IMAGE_BASE, &sections);

        let mut data = vec![0u8; 0x20];
        data[0x10..0x18].copy_from_slice(&[1, 0, 2, 0, 3, 0, 4, 0]);

        let walker = StructWalker::new(&data, translator);
        let spec = parse("<H").unwrap();
        let row = walker
            .decode_one(0x10, spec.byte_order, &spec.fields)
            .unwrap();
        assert_eq!(row, Row(vec![Value::UInt(1)]));
    }

    #[test]
    fn test_untranslatable_pointer() {
        let sections = vec![Section::new(0x1000, 0x100, 0x10)];
        let translator = AddressTranslator::new(IMAGE_BASE, &sections);
        let data = 0x409000u32.to_le_bytes();

        let spec = parse("<*I").unwrap();
        let err = StructWalker::new(&data, translator)
            .walk(0, None, Some(1), &spec)
            .unwrap_err();
        assert!(matches!(err, Error::AddressTranslation { address: 0x409000 }));
    }

    #[test]
    fn test_rows_stop_after_first_error() {
        let data = [1, 0, 2, 0, 3];
        let spec = parse("<H").unwrap();
        let translator = AddressTranslator::new(IMAGE_BASE, &[]);
        let walker = StructWalker::new(&data, translator);

        let results: Vec<Result<Row>> = walker.rows(0, Bound::Count(10), &spec).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(results[2], Err(Error::OutOfBounds { offset: 4, .. })));
    }

    #[test]
    fn test_unterminated_and_non_ascii_strings() {
        let err = walk_count(b"abc", "z", 1).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { .. }));

        let err = walk_count(b"a\xffb\0", "z", 1).unwrap_err();
        assert!(matches!(err, Error::InvalidText { offset: 1, byte: 0xff }));
    }
}
