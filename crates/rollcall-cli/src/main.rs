use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use rollcall_service::Config;
use rollcall_store::AttendanceDb;

#[derive(Parser)]
#[command(name = "rollcall", about = "rollcall attendance administration CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage class sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Manage enrolled students
    Student {
        #[command(subcommand)]
        action: StudentAction,
    },
    /// Attendance reports
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a session
    Add {
        /// Unique session code (e.g., "CS101")
        code: String,
        name: String,
        #[arg(short, long)]
        faculty: String,
    },
    /// List sessions
    List,
    /// Remove a session (by code) and its attendance records
    Remove {
        code: String,
    },
}

#[derive(Subcommand)]
enum StudentAction {
    /// List enrolled students
    List,
    /// Remove a student (by roll number) and their attendance records
    Remove {
        roll_number: String,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// Records on a calendar date (defaults to today)
    Date {
        date: Option<NaiveDate>,
    },
    /// Records for a session code
    Session {
        code: String,
    },
    /// Records for a student roll number
    Student {
        roll_number: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    let db = AttendanceDb::open(&config.db_path)?;

    match cli.command {
        Commands::Session { action } => match action {
            SessionAction::Add {
                code,
                name,
                faculty,
            } => {
                let session = db.add_session(&code, &name, &faculty)?;
                println!("created session {} ({})", session.code, session.id);
            }
            SessionAction::List => {
                for s in db.list_sessions()? {
                    println!("{}  {}  {}  [{}]", s.code, s.name, s.faculty, s.id);
                }
            }
            SessionAction::Remove { code } => {
                let session = db.session_by_code(&code)?;
                db.remove_session(&session.id)?;
                println!("removed session {}", session.code);
            }
        },
        Commands::Student { action } => match action {
            StudentAction::List => {
                for s in db.list_students()? {
                    println!("{}  {}  [{}]", s.roll_number, s.name, s.id);
                }
            }
            StudentAction::Remove { roll_number } => {
                let student = db
                    .list_students()?
                    .into_iter()
                    .find(|s| s.roll_number == roll_number)
                    .ok_or_else(|| anyhow::anyhow!("no student with roll number {roll_number}"))?;
                db.remove_student(&student.id)?;
                println!("removed {} ({})", student.name, student.roll_number);
            }
        },
        Commands::Report { action } => {
            let rows = match action {
                ReportAction::Date { date } => {
                    let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
                    db.records_on_date(date)?
                }
                ReportAction::Session { code } => {
                    let session = db.session_by_code(&code)?;
                    db.records_for_session(&session.id)?
                }
                ReportAction::Student { roll_number } => {
                    let student = db
                        .list_students()?
                        .into_iter()
                        .find(|s| s.roll_number == roll_number)
                        .ok_or_else(|| {
                            anyhow::anyhow!("no student with roll number {roll_number}")
                        })?;
                    db.records_for_student(&student.id)?
                }
            };
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}
