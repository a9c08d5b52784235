//
// Show where each virtual page of a process lives in physical memory
//
// Physical addresses need CAP_SYS_ADMIN (or root); without it every frame number reads as zero,
// but the present/swapped/file/exclusive/soft-dirty flags are still reported.
//
// Sample output (./pagemap-1234.txt):
//
// 55d0c4a00000-55d0c4a02000 r--p 00000000 fd:01 131  /usr/bin/cat
//  A1000000001B2F34 va=0x55d0c4a00000 pa=0x1b2f34000 stripe=13 present|file
//  0000000000000000 va=0x55d0c4a01000 pa=0x0 stripe=0 -
//

mod logger;
mod report;

use clap::Parser;
use pagemap::process::Process;
use pagemap::{Detect, MMapPath, PageGeometry, PagemapError, PagemapResult, TranslationEngine};
use report::Report;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "pagemap")]
#[command(about = "Show the mapping of a process's virtual pages to physical pages")]
#[command(version)]
struct Cli {
    /// Process to inspect
    #[arg(short, long, value_parser = clap::value_parser!(i32).range(1..))]
    pid: i32,

    /// Report file, or `-` for stdout [default: ./pagemap-<PID>.txt]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also translate the [vsyscall] region, which has no pagemap records on most kernels
    #[arg(long)]
    include_vsyscall: bool,

    /// Log more on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => PathBuf::from(format!("./pagemap-{}.txt", self.pid)),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    if let Err(e) = run(&cli) {
        log::error!("{}", e);
        std::process::exit(exit_code(&e));
    }
}

fn run(cli: &Cli) -> PagemapResult<()> {
    if !rustix::process::geteuid().is_root() {
        log::warn!("not running as root, physical addresses will read as zero");
    }

    let geometry = PageGeometry::detect()?;
    log::info!(
        "page size {:#x} (shift {})",
        geometry.page_size(),
        geometry.page_shift()
    );

    let process = Process::new(cli.pid)?;
    let lines = translated_lines(process.maps_lines()?, cli.include_vsyscall);
    let mut engine = TranslationEngine::new(lines, process.pagemap()?, geometry);

    let path = cli.output_path();
    let mut report = Report::new(open_output(&path)?);

    let result = write_report(&mut engine, &mut report);
    let summary = report.summary();
    match result {
        Ok(()) => {
            report.finish()?.flush()?;
            log::info!(
                "wrote {} pages ({} present, {} swapped) to {}",
                summary.pages,
                summary.present,
                summary.swapped,
                path.display()
            );
            Ok(())
        }
        Err(e) => {
            // whatever made it to the file is not a complete translation
            let _ = finish_incomplete(report, &path);
            log::error!(
                "{} is incomplete, stopped after {} pages",
                path.display(),
                summary.pages
            );
            Err(e)
        }
    }
}

fn write_report<L, T, W>(engine: &mut TranslationEngine<L, T>, report: &mut Report<W>) -> PagemapResult<()>
where
    L: Iterator<Item = io::Result<String>>,
    T: io::Read + io::Seek,
    W: Write,
{
    while let Some(page) = engine.next() {
        let page = page?;
        if let (Some(line), Some(request)) = (engine.current_line(), engine.current_request()) {
            if report.current_range() != Some(request.range) {
                report.region(line, request)?;
            }
        }
        report.page(&page)?;
    }
    Ok(())
}

/// Writes the trailer of a report that stopped early.  A failure here is only logged, since the
/// error that stopped the translation is the one worth reporting.
fn finish_incomplete<W: Write>(report: Report<W>, path: &Path) -> io::Result<W> {
    let result = report.finish().and_then(|mut out| out.flush().map(|()| out));
    if let Err(e) = &result {
        log::warn!("failed to write the trailer of {}: {}", path.display(), e);
    }
    result
}

/// Drops the `[vsyscall]` line unless asked to keep it.
fn translated_lines<I>(lines: I, include_vsyscall: bool) -> impl Iterator<Item = io::Result<String>>
where
    I: Iterator<Item = io::Result<String>>,
{
    lines.filter(move |line| include_vsyscall || !is_vsyscall(line))
}

fn is_vsyscall(line: &io::Result<String>) -> bool {
    matches!(
        line.as_deref().map(MMapPath::from_maps_line),
        Ok(Ok(MMapPath::Vsyscall))
    )
}

fn open_output(path: &Path) -> PagemapResult<BufWriter<Box<dyn Write>>> {
    let out: Box<dyn Write> = if path == Path::new("-") {
        Box::new(io::stdout())
    } else {
        let file = File::create(path).map_err(|e| PagemapError::Io(e, Some(path.to_owned())))?;
        Box::new(file)
    };
    Ok(BufWriter::new(out))
}

/// Distinct exit codes for the fatal translation errors; 1 for everything else.
fn exit_code(e: &PagemapError) -> i32 {
    match e {
        PagemapError::MalformedRange(_) => 201,
        PagemapError::Seek { .. } => 202,
        PagemapError::Read { .. } => 203,
        PagemapError::Configuration(_) => 3,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::{BufRead, Cursor};

    const PRESENT: u64 = 1 << 63;
    const SWAP: u64 = 1 << 62;
    const FILE: u64 = 1 << 61;

    const MAPS: &str = "1000-3000 r--p 00000000 fd:01 131  /usr/bin/cat
3000-3800 ---p 00000000 00:00 0
4000-5000 rw-p 00000000 00:00 0  [heap]
ffffffffff600000-ffffffffff601000 --xp 00000000 00:00 0  [vsyscall]
";

    /// Records for virtual pages 0..5; nothing backs the vsyscall page.
    fn table() -> Cursor<Vec<u8>> {
        let records = [0, PRESENT | 0x10, PRESENT | FILE | 0x20, 0, SWAP | 0x22];
        Cursor::new(records.iter().flat_map(|r| r.to_ne_bytes()).collect())
    }

    fn report_for(include_vsyscall: bool) -> (PagemapResult<()>, String) {
        let geometry = PageGeometry::new(0x1000).unwrap();
        let lines = translated_lines(Cursor::new(MAPS).lines(), include_vsyscall);
        let mut engine = TranslationEngine::new(lines, table(), geometry);

        let mut report = Report::new(Vec::new());
        let result = write_report(&mut engine, &mut report);
        let out = String::from_utf8(report.finish().unwrap()).unwrap();
        (result, out)
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_args() {
        let cli = Cli::try_parse_from(["pagemap", "--pid", "42"]).unwrap();
        assert_eq!(cli.pid, 42);
        assert_eq!(cli.output_path(), PathBuf::from("./pagemap-42.txt"));
        assert!(!cli.include_vsyscall);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::try_parse_from(["pagemap", "-p", "7", "-o", "-", "-vv", "--include-vsyscall"]).unwrap();
        assert_eq!(cli.output_path(), PathBuf::from("-"));
        assert!(cli.include_vsyscall);
        assert_eq!(cli.verbose, 2);

        // a pid is required, and 0 is not a pid
        assert!(Cli::try_parse_from(["pagemap"]).is_err());
        assert!(Cli::try_parse_from(["pagemap", "--pid", "0"]).is_err());
        assert!(Cli::try_parse_from(["pagemap", "--pid", "abc"]).is_err());
    }

    #[test]
    fn test_is_vsyscall() {
        let line = "ffffffffff600000-ffffffffff601000 --xp 00000000 00:00 0                  [vsyscall]";
        assert!(is_vsyscall(&Ok(line.to_string())));
        assert!(!is_vsyscall(&Ok("7ffd2de28000-7ffd2de49000 rw-p 00000000 00:00 0  [stack]".to_string())));
        assert!(!is_vsyscall(&Err(io::Error::from(io::ErrorKind::Other))));
    }

    #[test]
    fn test_write_report() {
        let (result, out) = report_for(false);
        result.unwrap();
        assert_eq!(
            out.lines().collect::<Vec<_>>(),
            vec![
                "1000-3000 r--p 00000000 fd:01 131  /usr/bin/cat",
                " 8000000000000010 va=0x1000 pa=0x10000 stripe=0 present",
                " A000000000000020 va=0x2000 pa=0x20000 stripe=0 present|file",
                "4000-5000 rw-p 00000000 00:00 0  [heap]",
                " 4000000000000022 va=0x4000 pa=0x22000 stripe=0 swapped swap=2:0x1",
                "# 2 regions, 3 pages, 2 present, 1 swapped",
                "# stripe 0 (0x0): 2 present pages",
            ]
        );
    }

    #[test]
    fn test_write_report_with_vsyscall() {
        let (result, out) = report_for(true);
        assert!(matches!(result, Err(PagemapError::Read { .. })));
        assert_eq!(exit_code(&result.unwrap_err()), 203);

        // a region is echoed with its first page, so the failed line never shows up
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(!out.contains("[vsyscall]"));
        assert_eq!(lines[5], "# 2 regions, 3 pages, 2 present, 1 swapped");
    }

    /// Accepts nothing.
    #[derive(Debug)]
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_finish_incomplete() {
        let path = Path::new("pagemap-1.txt");

        let out = finish_incomplete(Report::new(Vec::new()), path).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "# 0 regions, 0 pages, 0 present, 0 swapped\n");

        let err = finish_incomplete(Report::new(FullDisk), path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&PagemapError::MalformedRange(String::new())), 201);
        assert_eq!(
            exit_code(&PagemapError::Read {
                offset: 0,
                cause: io::Error::from(io::ErrorKind::UnexpectedEof)
            }),
            203
        );
        assert_eq!(exit_code(&PagemapError::NotFound(None)), 1);
    }
}
