use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use tutor_billing::application::store::PaymentStore;
use tutor_billing::config::StoreConfig;
use tutor_billing::domain::billing::LessonNumber;
use tutor_billing::domain::payment::{NewPayment, Payment, PaymentUpdate};
use tutor_billing::domain::ports::PaymentRepositoryBox;
use tutor_billing::domain::search::StudentQuery;
use tutor_billing::error::PaymentError;
use tutor_billing::infrastructure::in_memory::InMemoryPaymentRepository;
use tutor_billing::interfaces::csv::payment_reader::PaymentReader;
use tutor_billing::interfaces::csv::payment_writer::PaymentWriter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true, env = "TUTOR_BILLING_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Seconds a loaded payment list is reused before reloading from storage
    #[arg(long, global = true, default_value_t = 300, env = "TUTOR_BILLING_CACHE_TTL_SECS")]
    cache_ttl_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record every payment in a CSV file, then print all payments
    Import {
        /// Input payments CSV file
        input: PathBuf,
    },
    /// Record one paid month for a student
    Pay {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: String,
        #[arg(long, default_value = "")]
        group: String,
        #[arg(long)]
        month: String,
        #[arg(long)]
        amount: Option<Decimal>,
    },
    /// Rename the last paid month of a payment record
    Rename {
        #[arg(long)]
        payment_id: String,
        #[arg(long)]
        month: String,
        /// New payment timestamp (RFC 3339); the old one is kept if omitted
        #[arg(long)]
        date: Option<DateTime<Utc>>,
    },
    /// Delete a payment record and all its paid months
    Delete {
        #[arg(long)]
        payment_id: String,
    },
    /// Print payments as CSV
    List {
        #[arg(long, conflicts_with = "search")]
        student_id: Option<String>,
        /// `name:TEXT`, `code:TEXT` or `group:TEXT`
        #[arg(long)]
        search: Option<StudentQuery>,
    },
    /// Show whether a student has paid for a lesson
    Status {
        #[arg(long)]
        student_id: String,
        #[arg(long, allow_negative_numbers = true)]
        lesson: i64,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "tutor_billing=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn open_repository(db_path: Option<PathBuf>) -> Result<PaymentRepositoryBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            use tutor_billing::infrastructure::rocksdb::RocksDBStore;
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryPaymentRepository::new()))
        }
        None => Ok(Box::new(InMemoryPaymentRepository::new())),
    }
}

fn print_payments<'a>(payments: impl IntoIterator<Item = &'a Payment>) -> Result<()> {
    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer.write_payments(payments).into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let repository = open_repository(cli.db_path)?;
    let store = PaymentStore::new(repository, StoreConfig::with_cache_ttl_secs(cli.cache_ttl_secs));
    store.load().await.into_diagnostic()?;

    match cli.command {
        Command::Import { input } => {
            let file = File::open(input).into_diagnostic()?;
            let reader = PaymentReader::new(file);
            for submission in reader.payments() {
                match submission {
                    Ok(submission) => match store.add_payment(submission).await {
                        Ok(_) => {}
                        Err(e @ PaymentError::DuplicateMonth { .. }) => {
                            warn!("Skipping payment: {}", e);
                        }
                        Err(e @ PaymentError::Storage(_)) => return Err(e).into_diagnostic(),
                        Err(e) => warn!("Error recording payment: {}", e),
                    },
                    Err(e) => warn!("Error reading payment: {}", e),
                }
            }
            print_payments(&store.all().await.into_diagnostic()?)?;
        }
        Command::Pay {
            student_id,
            name,
            code,
            group,
            month,
            amount,
        } => {
            let payment = store
                .add_payment(NewPayment {
                    student_id,
                    student_name: name,
                    student_code: code,
                    group,
                    month,
                    amount,
                })
                .await
                .into_diagnostic()?;
            print_payments([&payment])?;
        }
        Command::Rename {
            payment_id,
            month,
            date,
        } => {
            let update = PaymentUpdate {
                month: Some(month),
                date,
                ..Default::default()
            };
            let payment = store
                .update_payment(&payment_id, update)
                .await
                .into_diagnostic()?;
            print_payments([&payment])?;
        }
        Command::Delete { payment_id } => {
            store.delete_payment(&payment_id).await.into_diagnostic()?;
            println!("deleted {payment_id}");
        }
        Command::List { student_id, search } => {
            let payments = match (student_id, search) {
                (Some(id), _) => store.list_for_student(&id).await,
                (None, Some(query)) => store.search(&query).await,
                (None, None) => store.all().await,
            }
            .into_diagnostic()?;
            print_payments(&payments)?;
        }
        Command::Status { student_id, lesson } => {
            let lesson = LessonNumber::new(lesson).into_diagnostic()?;
            let status = store
                .lesson_status(&student_id, lesson)
                .await
                .into_diagnostic()?;
            println!(
                "student={} lesson={} display_lesson={} period={} lessons={}-{} paid_months={} paid={}",
                student_id,
                status.lesson,
                status.display_lesson,
                status.period,
                status.first_lesson,
                status.last_lesson,
                status.paid_months,
                status.paid
            );
        }
    }

    Ok(())
}

