use std::fmt;

use prep_core::model::{ExamCategory, OptionKey, Question, QuestionId};
use storage::sqlite::SqliteRepository;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    category: Option<String>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("EXAMPREP_DB_URL").unwrap_or_else(|_| "sqlite:exam-prep.sqlite3".into());
        let mut category = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--category" => {
                    category = Some(require_value(&mut args, "--category")?);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, category })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:exam-prep.sqlite3)");
    eprintln!("  --category <name>         Only seed one exam category (CPA, CFA, FE)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  EXAMPREP_DB_URL");
}

type Sample = (&'static str, [&'static str; 4], &'static str, &'static str);

const SAMPLES: &[(&str, &[Sample])] = &[
    (
        "CPA",
        &[
            (
                "Which financial statement reports an entity's financial position at a point in time?",
                ["Income statement", "Balance sheet", "Statement of cash flows", "Statement of retained earnings"],
                "(B)",
                "The balance sheet presents assets, liabilities and equity as of a date.",
            ),
            (
                "Under accrual accounting, revenue is generally recognized when:",
                ["Cash is received", "The contract is signed", "Performance obligations are satisfied", "The invoice is mailed"],
                "c",
                "Revenue follows satisfaction of performance obligations.",
            ),
            (
                "Which inventory method results in the highest ending inventory when prices rise?",
                ["FIFO", "LIFO", "Weighted average", "Specific identification"],
                "A",
                "FIFO leaves the most recent, higher costs in ending inventory.",
            ),
            (
                "Depreciation is best described as:",
                ["A valuation technique", "A cash outflow", "Allocation of cost over useful life", "A liability"],
                "C",
                "",
            ),
        ],
    ),
    (
        "CFA",
        &[
            (
                "The duration of a zero-coupon bond is approximately equal to its:",
                ["Coupon rate", "Time to maturity", "Yield to maturity", "Convexity"],
                "(b)",
                "With no coupons, the only cash flow is at maturity.",
            ),
            (
                "Which measure captures systematic risk in CAPM?",
                ["Standard deviation", "Beta", "Alpha", "R-squared"],
                "B",
                "",
            ),
            (
                "A portfolio on the efficient frontier:",
                ["Has no risk", "Maximizes return for its level of risk", "Contains only bonds", "Has beta of zero"],
                "B",
                "",
            ),
            (
                "The Sharpe ratio divides excess return by:",
                ["Beta", "Tracking error", "Total standard deviation", "Downside deviation"],
                "C",
                "",
            ),
        ],
    ),
    (
        "FE",
        &[
            (
                "The derivative of sin(x) with respect to x is:",
                ["cos(x)", "-cos(x)", "-sin(x)", "tan(x)"],
                "A",
                "",
            ),
            (
                "Ohm's law relates voltage, current and:",
                ["Power", "Resistance", "Capacitance", "Frequency"],
                "(B)",
                "V = I * R.",
            ),
            (
                "The SI unit of force is the:",
                ["Joule", "Pascal", "Watt", "Newton"],
                "d",
                "",
            ),
            (
                "For a simply supported beam with a central point load, maximum moment occurs:",
                ["At the supports", "At midspan", "At quarter span", "Uniformly along the beam"],
                "B",
                "",
            ),
        ],
    ),
];

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;

    let mut seeded = 0_usize;
    for (category_name, questions) in SAMPLES {
        if args
            .category
            .as_deref()
            .is_some_and(|wanted| !wanted.eq_ignore_ascii_case(category_name))
        {
            continue;
        }
        let category = ExamCategory::new(*category_name)?;
        for (i, (text, options, correct, explanation)) in questions.iter().enumerate() {
            let id = QuestionId::new(format!("{}-{:03}", category_name.to_lowercase(), i + 1))?;
            let question = Question::new(
                id,
                *text,
                options.map(str::to_string),
                OptionKey::parse(correct)?,
                Some((*explanation).to_string()),
            )?;
            repo.upsert_question(&category, &question).await?;
            seeded += 1;
        }
    }

    println!("Seeded {seeded} questions into {}", args.db_url);

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
