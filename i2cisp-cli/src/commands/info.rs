//! Image info command implementation.

use {
    anyhow::{Context, Result},
    console::style,
    i2cisp::{PlannedChunk, crc16, plan_chunks},
    std::{fs, path::Path},
};

/// Image contents and its chunk plan.
#[derive(Debug)]
struct ImageInfo {
    name: String,
    size: usize,
    crc: u16,
    chunk_size: usize,
    chunks: Vec<PlannedChunk>,
}

fn load(image: &Path, chunk_size: usize) -> Result<ImageInfo> {
    let data =
        fs::read(image).with_context(|| format!("Failed to read image {}", image.display()))?;
    let chunks = plan_chunks(data.as_slice(), chunk_size)
        .with_context(|| format!("Cannot plan {}", image.display()))?;

    Ok(ImageInfo {
        name: image.display().to_string(),
        size: data.len(),
        crc: crc16(&data),
        chunk_size,
        chunks,
    })
}

/// Info command implementation.
pub(crate) fn cmd_info(image: &Path, chunk_size: usize, json: bool) -> Result<()> {
    let info = load(image, chunk_size)?;
    if json {
        return print_json(&info);
    }

    eprintln!("\n{}", style("Image").bold().underlined());
    eprintln!("  File:       {}", info.name);
    eprintln!("  Size:       {} bytes", info.size);
    eprintln!("  CRC16:      {:04X}", info.crc);
    eprintln!("  Chunk size: {} bytes", info.chunk_size);
    eprintln!("  Chunks:     {}", info.chunks.len());

    eprintln!("\n{}", style("Chunks").bold().underlined());
    eprintln!(
        "  {}",
        style(format!(
            "{:>5}  {:>10}  {:>6}  {:>10}  {:>5}",
            "#", "offset", "length", "address", "crc"
        ))
        .dim()
    );
    for chunk in &info.chunks {
        eprintln!(
            "  {:>5}  {:>#10x}  {:>6}  {}  {:04X}",
            chunk.index,
            chunk.offset,
            chunk.len,
            style(chunk.address).cyan(),
            chunk.crc
        );
    }

    Ok(())
}

/// Info command `--json` output: structured JSON to stdout.
fn print_json(info: &ImageInfo) -> Result<()> {
    let output = serde_json::json!({
        "ok": true,
        "data": {
            "file": info.name,
            "size": info.size,
            "crc": format!("0x{:04X}", info.crc),
            "chunk_size": info.chunk_size,
            "chunk_count": info.chunks.len(),
            "chunks": serde_json::to_value(&info.chunks)?,
        }
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
