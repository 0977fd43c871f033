//! Command-line front end: feed text files (or stdin) through the PDF
//! engine with flags mapping one-to-one onto the set options.

use std::io::{BufReader, Read};
use std::process::ExitCode;

use clap::Parser;

use lpt2pdf::{font_list, form_list, parse_linear, Error, Pdf};

const EXIT_INPUT: u8 = 1;
const EXIT_OUTPUT: u8 = 2;
const EXIT_BADARG: u8 = 3;
const EXIT_WRITE: u8 = 4;
const EXIT_INTERNAL: u8 = 7;

#[derive(Parser)]
#[command(
    name = "lpt2pdf",
    about = "Turn ASCII lineprinter output into a PDF on simulated stationery",
    after_help = "Defaults suit a standard lineprinter: 14.875 x 11.000 in, 6 LPI, 10 CPI.\n\
                  Linear dimensions accept an `in`, `cm`, or `mm` suffix.\n\
                  The output file must be seekable; `-` reads stdin.\n\
                  Use --list to see the available fonts and forms."
)]
struct Args {
    /// Height of the form bar (e.g. 0.5in)
    #[arg(long)]
    bar: Option<String>,
    /// Bottom margin; no bar below it
    #[arg(long)]
    bottom: Option<String>,
    /// Print columns, used to center output
    #[arg(long)]
    columns: Option<u32>,
    /// Characters per inch; fractional pitch is supported
    #[arg(long)]
    cpi: Option<f64>,
    /// Font for the input data (a core PDF font)
    #[arg(long)]
    font: Option<String>,
    /// Form background: plain, greenbar, bluebar, graybar, yellowbar
    #[arg(long)]
    form: Option<String>,
    /// JPEG image used as the form background
    #[arg(long)]
    image: Option<String>,
    /// Page length inclusive of margins
    #[arg(long)]
    length: Option<String>,
    /// Font for form labels
    #[arg(long)]
    lfont: Option<String>,
    /// Width of the line number columns; 0 omits them
    #[arg(long)]
    lno: Option<String>,
    /// Lines per inch: 6 or 8
    #[arg(long)]
    lpi: Option<u32>,
    /// Font for the line numbers
    #[arg(long)]
    nfont: Option<String>,
    /// Output file handling: new, append, or replace
    #[arg(long)]
    require: Option<String>,
    /// Tractor feed margin width on each side
    #[arg(long)]
    side: Option<String>,
    /// Title embedded in the PDF document
    #[arg(long)]
    title: Option<String>,
    /// Logical top-of-form line that a form feed advances to
    #[arg(long)]
    tof: Option<u32>,
    /// Top margin; above the first bar
    #[arg(long)]
    top: Option<String>,
    /// Page width inclusive of margins
    #[arg(long)]
    width: Option<String>,
    /// Write page streams uncompressed
    #[arg(long)]
    no_lzw: bool,
    /// Write a JSON-lines session trace to this path
    #[arg(long)]
    trace_log: Option<String>,
    /// List the known fonts and forms, then exit
    #[arg(long)]
    list: bool,
    /// Input files (`-` for stdin; default stdin), then the output file
    files: Vec<String>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Help and version are not argument errors.
            if err.use_stderr() {
                let _ = err.print();
                return ExitCode::from(EXIT_BADARG);
            }
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
    };

    if args.list {
        println!("Fonts:");
        for font in font_list() {
            println!("    {font}");
        }
        println!("Forms:");
        for form in form_list() {
            println!("    {}", titlecase(form));
        }
        return ExitCode::SUCCESS;
    }

    let (inputs, output) = match args.files.split_last() {
        Some((output, inputs)) if output.as_str() != "-" => (inputs.to_vec(), output.clone()),
        Some(_) => {
            // `-` names stdout, which is not seekable.
            eprintln!("lpt2pdf: the output must be a seekable file, not stdout");
            return ExitCode::from(EXIT_OUTPUT);
        }
        None => {
            eprintln!("lpt2pdf: an output file ending in .pdf is required");
            return ExitCode::from(EXIT_BADARG);
        }
    };

    let mut pdf = match Pdf::open(&output) {
        Ok(pdf) => pdf,
        Err(err) => {
            eprintln!("{output}: {err}");
            return ExitCode::from(EXIT_OUTPUT);
        }
    };

    if let Err(code) = configure(&mut pdf, &args) {
        return code;
    }

    let inputs: Vec<String> = if inputs.is_empty() {
        vec!["-".to_string()]
    } else {
        inputs
    };
    for input in &inputs {
        let status = if input == "-" {
            feed(&mut pdf, std::io::stdin().lock(), "<stdin>")
        } else {
            match std::fs::File::open(input) {
                Ok(file) => feed(&mut pdf, BufReader::new(file), input),
                Err(err) => {
                    eprintln!("{input}: {err}");
                    return ExitCode::from(EXIT_INPUT);
                }
            }
        };
        if let Err(code) = status {
            return code;
        }
    }

    if let Err(err) = pdf.close() {
        eprintln!("pdf_close failed: {err}");
        return ExitCode::from(write_failure_status(&err));
    }
    ExitCode::SUCCESS
}

/// Exit status for a failed print or close: a violated internal invariant
/// reports distinctly from ordinary write failures.
fn write_failure_status(err: &Error) -> u8 {
    if matches!(err, Error::Bugcheck) {
        EXIT_INTERNAL
    } else {
        EXIT_WRITE
    }
}

/// Apply every flag as a set option. Errors mirror the option name.
fn configure(pdf: &mut Pdf, args: &Args) -> Result<(), ExitCode> {
    let bad = |name: &str, err: Error| {
        eprintln!("{name}: {err}");
        ExitCode::from(EXIT_BADARG)
    };
    let linear = |name: &str, text: &str| {
        parse_linear(text).map_err(|err| bad(name, err))
    };

    if let Some(v) = &args.require {
        pdf.set_file_require(v).map_err(|e| bad("--require", e))?;
    }
    if let Some(v) = &args.form {
        pdf.set_form(v).map_err(|e| bad("--form", e))?;
    }
    if let Some(v) = &args.image {
        pdf.set_form_image(v).map_err(|e| bad("--image", e))?;
    }
    if let Some(v) = &args.font {
        pdf.set_text_font(v).map_err(|e| bad("--font", e))?;
    }
    if let Some(v) = &args.nfont {
        pdf.set_number_font(v).map_err(|e| bad("--nfont", e))?;
    }
    if let Some(v) = &args.lfont {
        pdf.set_label_font(v).map_err(|e| bad("--lfont", e))?;
    }
    if let Some(v) = &args.title {
        pdf.set_title(v).map_err(|e| bad("--title", e))?;
    }
    if let Some(v) = &args.bar {
        let v = linear("--bar", v)?;
        pdf.set_bar_height(v).map_err(|e| bad("--bar", e))?;
    }
    if let Some(v) = &args.top {
        let v = linear("--top", v)?;
        pdf.set_top_margin(v).map_err(|e| bad("--top", e))?;
    }
    if let Some(v) = &args.bottom {
        let v = linear("--bottom", v)?;
        pdf.set_bottom_margin(v).map_err(|e| bad("--bottom", e))?;
    }
    if let Some(v) = &args.side {
        let v = linear("--side", v)?;
        pdf.set_side_margin(v).map_err(|e| bad("--side", e))?;
    }
    if let Some(v) = &args.lno {
        let v = linear("--lno", v)?;
        pdf.set_lno_width(v).map_err(|e| bad("--lno", e))?;
    }
    if let Some(v) = &args.width {
        let v = linear("--width", v)?;
        pdf.set_page_width(v).map_err(|e| bad("--width", e))?;
    }
    if let Some(v) = &args.length {
        let v = linear("--length", v)?;
        pdf.set_page_length(v).map_err(|e| bad("--length", e))?;
    }
    if let Some(v) = args.cpi {
        pdf.set_cpi(v).map_err(|e| bad("--cpi", e))?;
    }
    if let Some(v) = args.lpi {
        pdf.set_lpi(v).map_err(|e| bad("--lpi", e))?;
    }
    if let Some(v) = args.columns {
        pdf.set_cols(v).map_err(|e| bad("--columns", e))?;
    }
    if let Some(v) = args.tof {
        pdf.set_tof_offset(v).map_err(|e| bad("--tof", e))?;
    }
    if args.no_lzw {
        pdf.set_no_lzw(true).map_err(|e| bad("--no-lzw", e))?;
    }
    if let Some(v) = &args.trace_log {
        pdf.set_trace_log(v).map_err(|e| bad("--trace-log", e))?;
    }
    Ok(())
}

/// Pump one input through the engine and report where it ended.
fn feed(pdf: &mut Pdf, mut reader: impl Read, name: &str) -> Result<(), ExitCode> {
    let mut total = 0u64;
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                eprintln!("{name}: {err}");
                return Err(ExitCode::from(EXIT_INPUT));
            }
        };
        total += n as u64;
        if let Err(err) = pdf.print(&buf[..n]) {
            eprintln!("pdf_print failed: {err}");
            return Err(ExitCode::from(write_failure_status(&err)));
        }
    }
    if total > 0 {
        eprintln!("Read {total} characters from {name}");
    }
    let (page, line) = pdf.position();
    eprintln!("End of {name}, at page {page} line {line}");
    Ok(())
}

fn titlecase(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, ch) in name.chars().enumerate() {
        if i == 0 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}
