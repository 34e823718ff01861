//! NumPy `.npy` files of little-endian `f32`
//!
//! Only what the pipeline needs is supported: version 1.0 (or 2.0, on read)
//! headers, `<f4` data, and C order.
use crate::Error;
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Dense `f32` array with its shape
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Array {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Array {
    /// Builds an array, checking that the shape matches the data
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, Error> {
        let n: usize = shape.iter().product();
        if n != data.len() {
            return Err(Error::BadArray(format!(
                "shape {shape:?} needs {n} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }
}

fn header(shape: &[usize]) -> Vec<u8> {
    let dims = match shape {
        [n] => format!("({n},)"),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    let mut h = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {dims}, }}"
    )
    .into_bytes();

    // Magic, version, and length take 10 bytes; the whole preamble is padded
    // with spaces to a multiple of 64 and ends in a newline
    let total = (10 + h.len() + 1).next_multiple_of(64);
    h.resize(total - 10 - 1, b' ');
    h.push(b'\n');
    h
}

fn shape_mismatch(shape: &[usize], n: usize) -> Error {
    let expected: usize = shape.iter().product();
    Error::BadArray(format!("shape {shape:?} needs {expected} values, got {n}"))
}

fn write_header<W: Write>(out: &mut W, shape: &[usize]) -> Result<(), Error> {
    let h = header(shape);
    let len = u16::try_from(h.len())
        .map_err(|_| Error::BadArray("header too long".to_owned()))?;
    out.write_all(MAGIC)?;
    out.write_all(&[1, 0])?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(&h)?;
    Ok(())
}

/// Writes an array in `.npy` format
pub fn encode_f32<W: Write>(
    out: &mut W,
    shape: &[usize],
    data: &[f32],
) -> Result<(), Error> {
    encode_chunks(out, shape, [Ok::<_, Error>(data)])
}

/// Writes an array whose data arrives in pieces
///
/// Fails with [`Error::BadArray`] if the pieces do not add up to `shape`.
fn encode_chunks<W, I, C>(
    out: &mut W,
    shape: &[usize],
    chunks: I,
) -> Result<(), Error>
where
    W: Write,
    I: IntoIterator<Item = Result<C, Error>>,
    C: AsRef<[f32]>,
{
    let expected: usize = shape.iter().product();
    let mut out = BufWriter::new(out);
    write_header(&mut out, shape)?;
    let mut n = 0;
    for chunk in chunks {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        n += chunk.len();
        if n > expected {
            return Err(shape_mismatch(shape, n));
        }
        for v in chunk {
            out.write_all(&v.to_le_bytes())?;
        }
    }
    if n != expected {
        return Err(shape_mismatch(shape, n));
    }
    out.flush()?;
    Ok(())
}

/// Reads an `.npy` array of `<f4` values
pub fn decode_f32<R: Read>(input: &mut R) -> Result<Array, Error> {
    let mut preamble = [0u8; 8];
    input.read_exact(&mut preamble)?;
    if &preamble[..6] != MAGIC {
        return Err(Error::BadArray("missing .npy magic string".to_owned()));
    }
    let header_len = match preamble[6] {
        1 => {
            let mut b = [0u8; 2];
            input.read_exact(&mut b)?;
            u16::from_le_bytes(b) as usize
        }
        2 | 3 => {
            let mut b = [0u8; 4];
            input.read_exact(&mut b)?;
            u32::from_le_bytes(b) as usize
        }
        v => {
            return Err(Error::BadArray(format!("unsupported version {v}")));
        }
    };
    let mut h = vec![0u8; header_len];
    input.read_exact(&mut h)?;
    let h = String::from_utf8(h)
        .map_err(|_| Error::BadArray("header is not text".to_owned()))?;
    let shape = parse_header(&h)?;

    let mut bytes = vec![];
    input.read_to_end(&mut bytes)?;
    let n: usize = shape.iter().product();
    if bytes.len() != n * 4 {
        return Err(Error::BadArray(format!(
            "shape {shape:?} needs {} bytes of data, found {}",
            n * 4,
            bytes.len()
        )));
    }
    let data = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(Array { shape, data })
}

/// Extracts the shape from a header dictionary, checking dtype and order
fn parse_header(h: &str) -> Result<Vec<usize>, Error> {
    let compact: String = h.chars().filter(|c| !c.is_whitespace()).collect();
    if !compact.contains("'descr':'<f4'") {
        return Err(Error::BadArray(format!("unsupported dtype in {h:?}")));
    }
    if !compact.contains("'fortran_order':False") {
        return Err(Error::BadArray(
            "Fortran order is not supported".to_owned(),
        ));
    }
    let dims = compact
        .split_once("'shape':(")
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(dims, _)| dims)
        .ok_or_else(|| Error::BadArray(format!("no shape in {h:?}")))?;
    dims.split(',')
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| Error::BadArray(format!("bad dimension {d:?}")))
        })
        .collect()
}

/// Writes an array to `path` atomically
///
/// Data goes to a temporary file in the same directory, which is then
/// renamed over `path`; readers never see a partial file, and the temporary
/// file is removed if anything fails.  Parent directories are created as
/// needed.
pub fn write_f32(
    path: &Path,
    shape: &[usize],
    data: &[f32],
) -> Result<(), Error> {
    write_chunks(path, shape, [Ok::<_, Error>(data)])
}

/// Writes an array to `path` atomically, one piece at a time
///
/// This lets large arrays be assembled without holding them in memory.
pub fn write_chunks<I, C>(
    path: &Path,
    shape: &[usize],
    chunks: I,
) -> Result<(), Error>
where
    I: IntoIterator<Item = Result<C, Error>>,
    C: AsRef<[f32]>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;
    encode_chunks(tmp.as_file_mut(), shape, chunks)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::from(e.error))?;
    Ok(())
}

/// Reads an array from `path`
pub fn read_f32(path: &Path) -> Result<Array, Error> {
    let mut f = BufReader::new(File::open(path)?);
    decode_f32(&mut f)
}
