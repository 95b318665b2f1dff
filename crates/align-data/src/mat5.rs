//! MAT v5 element reader for the variable classes `matfile` skips.
//!
//! `matfile` only returns numeric arrays; struct, cell and char arrays are
//! dropped while parsing. Recordings exported as a `trial_data` struct array
//! need those, so this module walks the element stream itself. Compressed
//! variables are inflated with `libflate`.

use std::io::Read;

use libflate::zlib::Decoder;

const HEADER_LEN: usize = 128;

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;

const MX_CELL: u8 = 1;
const MX_STRUCT: u8 = 2;
const MX_CHAR: u8 = 4;
const MX_NUMERIC: std::ops::RangeInclusive<u8> = 6..=15;

/// A decoded MAT variable.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MatValue {
    /// Real part of a numeric array, column-major.
    Numeric { dims: Vec<usize>, values: Vec<f64> },
    Text(String),
    /// `elements[i][f]` is field `f` of element `i` (column-major order).
    Struct {
        dims: Vec<usize>,
        fields: Vec<String>,
        elements: Vec<Vec<MatValue>>,
    },
    Cell { dims: Vec<usize>, items: Vec<MatValue> },
    /// Sparse, object and other classes.
    Unsupported { class: u8 },
}

impl MatValue {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            MatValue::Numeric { .. } => "numeric",
            MatValue::Text(_) => "char",
            MatValue::Struct { .. } => "struct",
            MatValue::Cell { .. } => "cell",
            MatValue::Unsupported { .. } => "unsupported",
        }
    }
}

type ReadResult<T> = std::result::Result<T, String>;

/// Decode every top-level variable of a MAT v5 file.
pub(crate) fn read_variables(bytes: &[u8]) -> ReadResult<Vec<(String, MatValue)>> {
    if bytes.len() < HEADER_LEN {
        return Err("file is too short for a MAT v5 header".to_string());
    }
    let big_endian = match &bytes[126..128] {
        b"IM" => false,
        b"MI" => true,
        _ => return Err("missing MAT v5 endian indicator".to_string()),
    };

    let mut reader = Reader {
        buf: bytes,
        pos: HEADER_LEN,
        big_endian,
    };
    let mut variables = Vec::new();
    while reader.remaining() >= 8 {
        let (data_type, data) = reader.element()?;
        match data_type {
            MI_MATRIX => variables.push(parse_matrix(data, big_endian)?),
            MI_COMPRESSED => {
                let inflated = inflate(data)?;
                let mut inner = Reader {
                    buf: &inflated,
                    pos: 0,
                    big_endian,
                };
                let (inner_type, inner_data) = inner.element()?;
                if inner_type == MI_MATRIX {
                    variables.push(parse_matrix(inner_data, big_endian)?);
                }
            }
            _ => {}
        }
    }
    Ok(variables)
}

fn inflate(data: &[u8]) -> ReadResult<Vec<u8>> {
    let mut decoder = Decoder::new(data).map_err(|e| format!("bad compressed variable: {}", e))?;
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| format!("bad compressed variable: {}", e))?;
    Ok(out)
}

// ── Element stream ────────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> ReadResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(format!(
                "element of {} bytes overruns the data at offset {}",
                n, self.pos
            ));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u32(&mut self) -> ReadResult<u32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(if self.big_endian {
            u32::from_be_bytes(word)
        } else {
            u32::from_le_bytes(word)
        })
    }

    /// One `(data type, payload)` element, in either the regular or the
    /// small (4-byte payload packed into the tag) format.
    fn element(&mut self) -> ReadResult<(u32, &'a [u8])> {
        let first = self.u32()?;
        if first >> 16 != 0 {
            let len = (first >> 16) as usize;
            let packed = self.take(4)?;
            if len > 4 {
                return Err(format!("small element claims {} bytes", len));
            }
            return Ok((first & 0xFFFF, &packed[..len]));
        }

        let len = self.u32()? as usize;
        let data = self.take(len)?;
        if first != MI_COMPRESSED {
            let padded = (self.pos + 7) / 8 * 8;
            self.pos = padded.min(self.buf.len());
        }
        Ok((first, data))
    }
}

// ── Array decoding ────────────────────────────────────────────────────────────

fn parse_matrix(payload: &[u8], big_endian: bool) -> ReadResult<(String, MatValue)> {
    if payload.is_empty() {
        return Ok((
            String::new(),
            MatValue::Numeric {
                dims: vec![0, 0],
                values: Vec::new(),
            },
        ));
    }

    let mut reader = Reader {
        buf: payload,
        pos: 0,
        big_endian,
    };
    let (_, flags) = reader.element()?;
    if flags.len() < 4 {
        return Err("array flags are truncated".to_string());
    }
    let class = if big_endian { flags[3] } else { flags[0] };

    let (dims_type, dims_raw) = reader.element()?;
    let dims = decode_numbers(dims_type, dims_raw, big_endian)?
        .into_iter()
        .map(|d| {
            if d >= 0.0 {
                Ok(d as usize)
            } else {
                Err(format!("negative dimension {}", d))
            }
        })
        .collect::<ReadResult<Vec<usize>>>()?;
    let n_elements: usize = dims.iter().product();

    let (_, name_raw) = reader.element()?;
    let name = text_from_bytes(name_raw);

    let value = match class {
        MX_STRUCT => {
            let (len_type, len_raw) = reader.element()?;
            let name_len = decode_numbers(len_type, len_raw, big_endian)?
                .first()
                .map(|&v| v as usize)
                .filter(|&v| v > 0)
                .ok_or_else(|| format!("struct {} has no field-name length", name))?;
            let (_, names_raw) = reader.element()?;
            let fields: Vec<String> = names_raw.chunks_exact(name_len).map(text_from_bytes).collect();

            let mut elements = Vec::with_capacity(n_elements);
            for _ in 0..n_elements {
                let mut row = Vec::with_capacity(fields.len());
                for _ in &fields {
                    row.push(nested_matrix(&mut reader, big_endian)?);
                }
                elements.push(row);
            }
            MatValue::Struct {
                dims,
                fields,
                elements,
            }
        }
        MX_CELL => {
            let items = (0..n_elements)
                .map(|_| nested_matrix(&mut reader, big_endian))
                .collect::<ReadResult<Vec<_>>>()?;
            MatValue::Cell { dims, items }
        }
        MX_CHAR => {
            if reader.remaining() == 0 {
                MatValue::Text(String::new())
            } else {
                let (data_type, data) = reader.element()?;
                MatValue::Text(decode_text(data_type, data, big_endian)?)
            }
        }
        c if MX_NUMERIC.contains(&c) => {
            let values = if reader.remaining() == 0 {
                Vec::new()
            } else {
                let (data_type, data) = reader.element()?;
                decode_numbers(data_type, data, big_endian)?
            };
            if values.len() != n_elements {
                return Err(format!(
                    "{} declares {:?} but holds {} values",
                    name,
                    dims,
                    values.len()
                ));
            }
            MatValue::Numeric { dims, values }
        }
        other => MatValue::Unsupported { class: other },
    };
    Ok((name, value))
}

fn nested_matrix(reader: &mut Reader<'_>, big_endian: bool) -> ReadResult<MatValue> {
    let (data_type, data) = reader.element()?;
    if data_type != MI_MATRIX {
        return Err(format!("expected a nested matrix, found data type {}", data_type));
    }
    Ok(parse_matrix(data, big_endian)?.1)
}

fn text_from_bytes(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn decode_text(data_type: u32, data: &[u8], big_endian: bool) -> ReadResult<String> {
    match data_type {
        MI_UTF8 | MI_UINT8 | MI_INT8 => Ok(String::from_utf8_lossy(data).into_owned()),
        MI_UTF16 | MI_UINT16 => {
            let units: Vec<u16> = data
                .chunks_exact(2)
                .map(|c| {
                    let pair = [c[0], c[1]];
                    if big_endian {
                        u16::from_be_bytes(pair)
                    } else {
                        u16::from_le_bytes(pair)
                    }
                })
                .collect();
            Ok(String::from_utf16_lossy(&units))
        }
        other => Err(format!("unsupported char encoding {}", other)),
    }
}

fn decode_numbers(data_type: u32, data: &[u8], big_endian: bool) -> ReadResult<Vec<f64>> {
    macro_rules! decode {
        ($t:ty, $n:expr) => {
            data.chunks_exact($n)
                .map(|c| {
                    let mut raw = [0u8; $n];
                    raw.copy_from_slice(c);
                    let v = if big_endian {
                        <$t>::from_be_bytes(raw)
                    } else {
                        <$t>::from_le_bytes(raw)
                    };
                    v as f64
                })
                .collect()
        };
    }

    Ok(match data_type {
        MI_INT8 => data.iter().map(|&b| b as i8 as f64).collect(),
        MI_UINT8 => data.iter().map(|&b| b as f64).collect(),
        MI_INT16 => decode!(i16, 2),
        MI_UINT16 => decode!(u16, 2),
        MI_INT32 => decode!(i32, 4),
        MI_UINT32 => decode!(u32, 4),
        MI_SINGLE => decode!(f32, 4),
        MI_DOUBLE => decode!(f64, 8),
        MI_INT64 => decode!(i64, 8),
        MI_UINT64 => decode!(u64, 8),
        other => return Err(format!("unsupported numeric data type {}", other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mat::fixture::{mat_bytes, Field, MatElement};

    #[test]
    fn test_reads_struct_with_text_and_empty_fields() {
        let bytes = mat_bytes(
            &[MatElement::Struct {
                name: "trial_data".to_string(),
                fields: vec!["monkey".to_string(), "trial_id".to_string(), "idx_go_cue".to_string()],
                rows: vec![
                    vec![Field::text("Chewie"), Field::scalar(1.0), Field::scalar(4.0)],
                    vec![Field::text("Chewie"), Field::scalar(2.0), Field::Empty],
                ],
            }],
            false,
        );

        let vars = read_variables(&bytes).unwrap();
        assert_eq!(vars.len(), 1);
        let (name, value) = &vars[0];
        assert_eq!(name, "trial_data");
        let MatValue::Struct {
            dims,
            fields,
            elements,
        } = value
        else {
            panic!("expected a struct, got {}", value.kind());
        };
        assert_eq!(dims, &vec![1, 2]);
        assert_eq!(fields, &vec!["monkey", "trial_id", "idx_go_cue"]);
        assert_eq!(elements[0][0], MatValue::Text("Chewie".to_string()));
        assert_eq!(
            elements[1][1],
            MatValue::Numeric {
                dims: vec![1, 1],
                values: vec![2.0]
            }
        );
        assert_eq!(
            elements[1][2],
            MatValue::Numeric {
                dims: vec![0, 0],
                values: vec![]
            }
        );
    }

    #[test]
    fn test_compressed_variables_are_inflated() {
        let elements = [
            MatElement::Double {
                name: "x".to_string(),
                rows: 2,
                cols: 1,
                values: vec![1.5, -2.0],
            },
            MatElement::Cell {
                name: "labels".to_string(),
                items: vec![Field::text("a")],
            },
        ];
        let plain = read_variables(&mat_bytes(&elements, false)).unwrap();
        let packed = read_variables(&mat_bytes(&elements, true)).unwrap();
        assert_eq!(plain, packed);
        assert_eq!(packed[1].1.kind(), "cell");
    }

    #[test]
    fn test_truncated_file_is_an_error() {
        let bytes = mat_bytes(
            &[MatElement::Double {
                name: "x".to_string(),
                rows: 1,
                cols: 3,
                values: vec![1.0, 2.0, 3.0],
            }],
            false,
        );
        assert!(read_variables(&bytes[..bytes.len() - 12]).is_err());
        assert!(read_variables(&bytes[..64]).is_err());
    }
}
