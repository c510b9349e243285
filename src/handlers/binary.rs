use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::{Compression, write::GzEncoder};

/// 把浮点数组序列化为小端 f64 二进制，屏蔽的 cell 保持 NaN
pub fn encode_f64_le(values: &[f64]) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(values));
    for &value in values {
        bytes.write_f64::<LittleEndian>(value)?;
    }
    Ok(bytes)
}

pub fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
