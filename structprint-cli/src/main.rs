use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use structprint_core::{parse, parse_count, parse_hex, ExtractionRequest, Image, StructWalker};

/// Print structs out of a PE image
#[derive(Parser, Debug)]
#[command(
    name = "structprint",
    about = "A utility to print structs out of a DLL or EXE",
    version,
    author
)]
struct Cli {
    /// PE file to extract from
    #[arg(long)]
    file: std::path::PathBuf,

    /// Hex address to start at; virtual if at or above the image base, a file offset otherwise
    #[arg(long, value_parser = parse_hex, required_unless_present = "list_sections")]
    start: Option<u64>,

    /// Hex address to stop at. Alternatively use --count
    #[arg(long, value_parser = parse_hex)]
    end: Option<u64>,

    /// Number of entries to print, decimal or 0x-prefixed hex. Alternatively use --end
    #[arg(long, value_parser = parse_count)]
    count: Option<u64>,

    /// Struct format to print with. Prefix a token with * to dereference a
    /// pointer, group tokens in parentheses to dereference a whole struct,
    /// use z for a NUL-terminated string and & to display a field as hex
    #[arg(long, required_unless_present = "list_sections")]
    format: Option<String>,

    /// Print each row as a JSON array
    #[arg(long)]
    json: bool,

    /// Show the image base and section table instead of extracting
    #[arg(long)]
    list_sections: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list_sections {
        let image = Image::open(&cli.file)?;
        print_sections(&mut std::io::stdout().lock(), &image)?;
        return Ok(());
    }

    let request = ExtractionRequest {
        start: cli.start.context("--start is required")?,
        end: cli.end,
        count: cli.count,
        format: cli.format.context("--format is required")?,
    };

    // Bail on a bad end/count pair before the file is read.
    request.bound()?;
    let spec = parse(&request.format)?;

    let image = Image::open(&cli.file)
        .with_context(|| format!("Failed to load {}", cli.file.display()))?;
    log::debug!("Loaded {} ({} bytes)", image.path, image.data.len());
    let translator = image.translator();
    let (start, bound) = request.resolve(&translator)?;

    let walker = StructWalker::new(&image.data, translator);
    let mut out = std::io::stdout().lock();
    for row in walker.rows(start, bound, &spec) {
        let row = row.with_context(|| format!("Failed to decode {:?}", request.format))?;
        if cli.json {
            writeln!(out, "{}", serde_json::to_string(&row)?)?;
        } else {
            writeln!(out, "{row}")?;
        }
    }

    Ok(())
}

fn print_sections(out: &mut impl Write, image: &Image) -> std::io::Result<()> {
    writeln!(out, "Image base: 0x{:x}", image.image_base)?;
    if image.sections.is_empty() {
        return writeln!(out, "No sections found.");
    }

    writeln!(
        out,
        "{:<10} {:<18} {:<10} {:<10} {:<10}",
        "Section", "VMA", "Raw size", "Raw ptr", "Flags"
    )?;
    writeln!(out, "{}", "-".repeat(62))?;
    for s in &image.sections {
        // Section RVAs come straight from the file and may be garbage.
        writeln!(
            out,
            "{:<10} 0x{:<16x} {:<10x} {:<10x} {:<10x}",
            s.name,
            image.image_base.wrapping_add(s.virtual_address),
            s.raw_size,
            s.raw_pointer,
            s.characteristics
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count_args() {
        let cli = Cli::try_parse_from([
            "structprint",
            "--file",
            "game.dll",
            "--start",
            "0x401000",
            "--count",
            "0x10",
            "--format",
            "<*zI",
        ])
        .unwrap();

        assert_eq!(cli.file, std::path::PathBuf::from("game.dll"));
        assert_eq!(cli.start, Some(0x401000));
        assert_eq!(cli.count, Some(16));
        assert!(cli.end.is_none());
        assert_eq!(cli.format.as_deref(), Some("<*zI"));
        assert!(!cli.json);
    }

    #[test]
    fn test_parse_end_args() {
        let cli = Cli::try_parse_from([
            "structprint",
            "--file",
            "game.dll",
            "--start",
            "401000",
            "--end",
            "401100",
            "--format",
            "I",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.start, Some(0x401000));
        assert_eq!(cli.end, Some(0x401100));
        assert!(cli.count.is_none());
        assert!(cli.json);
    }

    #[test]
    fn test_end_and_count_reach_request_validation() {
        // clap accepts both; the conflict is reported as a configuration error.
        let cli = Cli::try_parse_from([
            "structprint",
            "--file",
            "game.dll",
            "--start",
            "0",
            "--end",
            "10",
            "--count",
            "1",
            "--format",
            "I",
        ])
        .unwrap();

        let request = ExtractionRequest {
            start: cli.start.unwrap(),
            end: cli.end,
            count: cli.count,
            format: cli.format.unwrap(),
        };
        assert!(matches!(
            request.bound(),
            Err(structprint_core::Error::Configuration(_))
        ));
    }

    #[test]
    fn test_start_and_format_required() {
        let result = Cli::try_parse_from(["structprint", "--file", "game.dll", "--count", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_list_sections_needs_only_file() {
        let cli =
            Cli::try_parse_from(["structprint", "--file", "game.dll", "--list-sections"]).unwrap();
        assert!(cli.list_sections);
        assert!(cli.start.is_none());
    }

    #[test]
    fn test_section_listing_survives_huge_rva() {
        let mut section = structprint_core::Section::new(u64::MAX - 0xfff, 0x200, 0x400);
        section.name = ".evil".to_string();
        let image = Image {
            path: "evil.dll".to_string(),
            data: Vec::new(),
            image_base: 0x400000,
            sections: vec![section],
        };

        let mut out = Vec::new();
        print_sections(&mut out, &image).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Image base: 0x400000\n"));
        assert!(text.contains(".evil"));
        assert!(text.contains("0x3ff000"));
    }

    #[test]
    fn test_bad_numbers_rejected() {
        let result = Cli::try_parse_from([
            "structprint",
            "--file",
            "game.dll",
            "--start",
            "zz",
            "--count",
            "1",
            "--format",
            "I",
        ]);
        assert!(result.is_err());

        let result = Cli::try_parse_from([
            "structprint",
            "--file",
            "game.dll",
            "--start",
            "0",
            "--count",
            "ten",
            "--format",
            "I",
        ]);
        assert!(result.is_err());
    }
}
