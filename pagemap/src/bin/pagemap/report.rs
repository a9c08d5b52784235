use pagemap::{ResolvedPage, Stripe, TranslationRequest, VirtualRange};
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Page totals for a report.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub regions: u64,
    pub pages: u64,
    pub present: u64,
    pub swapped: u64,
}

/// Writes the text report: each translated maps line, followed by one line per page, and a
/// per-stripe count of present pages at the end.
pub struct Report<W: Write> {
    out: W,
    current: Option<VirtualRange>,
    summary: Summary,
    stripes: BTreeMap<Stripe, u64>,
}

impl<W: Write> Report<W> {
    pub fn new(out: W) -> Self {
        Report {
            out,
            current: None,
            summary: Summary::default(),
            stripes: BTreeMap::new(),
        }
    }

    pub fn current_range(&self) -> Option<VirtualRange> {
        self.current
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Starts a new region.
    pub fn region(&mut self, line: &str, request: &TranslationRequest) -> io::Result<()> {
        self.current = Some(request.range);
        self.summary.regions += 1;
        writeln!(self.out, "{}", line)?;
        log::debug!(
            "{:#x}-{:#x}: {} pages at pagemap offset {:#x}",
            request.range.start,
            request.range.end,
            request.page_count,
            request.table_offset
        );
        Ok(())
    }

    pub fn page(&mut self, page: &ResolvedPage) -> io::Result<()> {
        self.summary.pages += 1;
        if page.present {
            self.summary.present += 1;
            *self.stripes.entry(page.stripe).or_insert(0) += 1;
        }
        if page.swapped {
            self.summary.swapped += 1;
        }

        write!(
            self.out,
            " {} va={:#x} pa={:#x} stripe={} {}",
            page.raw,
            page.virtual_addr,
            page.physical_addr,
            page.stripe,
            flag_names(page)
        )?;
        if page.swapped {
            write!(
                self.out,
                " swap={}:{:#x}",
                page.raw.swap_type(),
                page.raw.swap_offset()
            )?;
        }
        writeln!(self.out)
    }

    /// Writes the trailer and hands back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        let s = self.summary;
        writeln!(
            self.out,
            "# {} regions, {} pages, {} present, {} swapped",
            s.regions, s.pages, s.present, s.swapped
        )?;
        for (stripe, count) in &self.stripes {
            writeln!(
                self.out,
                "# stripe {} ({:#x}): {} present pages",
                stripe,
                stripe.base(),
                count
            )?;
        }
        Ok(self.out)
    }
}

fn flag_names(page: &ResolvedPage) -> String {
    let names: Vec<&str> = [
        (page.present, "present"),
        (page.swapped, "swapped"),
        (page.file_or_shared_anon, "file"),
        (page.exclusive, "exclusive"),
        (page.soft_dirty, "soft-dirty"),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .map(|(_, name)| *name)
    .collect();

    if names.is_empty() {
        "-".to_string()
    } else {
        names.join("|")
    }
}
