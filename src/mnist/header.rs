// Fixed-size headers of the IDX image and label files.
// Parsing works on plain byte arrays so the format can be tested without any I/O.

pub const IMAGE_MAGIC: u32 = 0x0000_0803;
pub const LABEL_MAGIC: u32 = 0x0000_0801;
pub const IMAGE_HEADER_LEN: usize = 16;
pub const LABEL_HEADER_LEN: usize = 8;

// Reads big-endian fields from the front of a byte slice
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn read_u32_be(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.position..self.position + 4)?;
        self.position += 4;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub count: u32,
    pub rows: u32,
    pub cols: u32,
}

impl ImageHeader {
    pub fn parse(bytes: &[u8; IMAGE_HEADER_LEN]) -> Result<Self, String> {
        let mut reader = ByteReader::new(bytes);
        let mut field = || reader.read_u32_be().ok_or("truncated image header");
        let magic = field()?;
        let count = field()?;
        let rows = field()?;
        let cols = field()?;
        if magic != IMAGE_MAGIC {
            return Err(format!(
                "bad image magic 0x{:08x}, expected 0x{:08x}",
                magic, IMAGE_MAGIC
            ));
        }
        if rows == 0 || cols == 0 {
            return Err(format!("empty raster dimensions {}x{}", rows, cols));
        }
        if rows.checked_mul(cols).is_none() {
            return Err(format!("raster dimensions {}x{} overflow", rows, cols));
        }
        Ok(ImageHeader { count, rows, cols })
    }

    // rows * cols fits in a u32, checked by `parse`
    pub fn raster_len(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    // Bytes the header says follow it. Both factors fit in a u32, so the product fits in a u64.
    pub fn data_len(&self) -> u64 {
        self.raster_len() as u64 * self.count as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelHeader {
    pub count: u32,
}

impl LabelHeader {
    pub fn parse(bytes: &[u8; LABEL_HEADER_LEN]) -> Result<Self, String> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.read_u32_be().ok_or("truncated label header")?;
        let count = reader.read_u32_be().ok_or("truncated label header")?;
        if magic != LABEL_MAGIC {
            return Err(format!(
                "bad label magic 0x{:08x}, expected 0x{:08x}",
                magic, LABEL_MAGIC
            ));
        }
        Ok(LabelHeader { count })
    }
}
