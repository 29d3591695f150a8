use std::io::{BufRead, Write};
use std::process::ExitCode;

mod cli;
mod view;

use agenda::config::AgendaConfig;
use agenda::core::contact::ContactId;
use agenda::core::draft::DraftStore;
use agenda::form::{ContactForm, FormMode, PhotoFile, SubmitError};
use agenda::repository::{ContactRepository, RepositoryEvent};

use clap::Parser;
use cli::{Args, Command, FieldArgs};

fn init_logging(config: &AgendaConfig) {
    // Journal logging (`journalctl --user -t agenda -f`). Agenda targets at
    // info/debug per config, everything else at warn.
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            let target = metadata.target();
            if target.starts_with("agenda") {
                let max = if agenda::debug_logging() { log::LevelFilter::Debug } else { log::LevelFilter::Info };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    agenda::set_debug_logging(config.debug_logging);

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(j) => j.with_syslog_identifier("agenda".to_string()),
        Err(e) => {
            eprintln!("journal logging unavailable: {}", e);
            return;
        }
    };
    if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
        // Global max must be Debug so agenda debug logs can pass through when toggled
        log::set_max_level(log::LevelFilter::Debug);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = AgendaConfig::load();
    if args.debug {
        config.debug_logging = true;
    }
    init_logging(&config);

    match run(args, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: &AgendaConfig) -> agenda::Result<ExitCode> {
    let drafts = DraftStore::new(config.draft_path());

    match args.command.unwrap_or(Command::List) {
        Command::Draft { discard } => {
            if discard {
                drafts.clear()?;
                println!("Draft discarded.");
            } else {
                match drafts.load()? {
                    Some(fields) => print!("{}", view::render_draft(&fields)),
                    None => println!("No saved draft."),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::List => {
            let mut repo = ContactRepository::new(config)?;
            print!("{}", view::render_list(&repo));
            let fetched = repo.fetch_contacts().await;
            print!("{}", view::render_list(&repo));
            Ok(if fetched.is_ok() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Add(field_args) => {
            let mut repo = ContactRepository::new(config)?;
            let form = ContactForm::new(drafts);
            save(form, &field_args, &mut repo).await
        }
        Command::Edit { id, fields } => {
            let mut repo = ContactRepository::new(config)?;
            repo.fetch_contacts().await?;
            let Some(contact) = repo.contact(id) else {
                eprintln!("No contact with id {}", id);
                return Ok(ExitCode::FAILURE);
            };
            let form = ContactForm::edit(contact);
            save(form, &fields, &mut repo).await
        }
        Command::Delete { id, yes } => {
            let mut repo = ContactRepository::new(config)?;
            repo.fetch_contacts().await?;
            delete(&mut repo, id, yes, &mut std::io::stdin().lock()).await
        }
    }
}

/// Apply command-line edits. A rejected photo stops the save.
fn apply_fields(form: &mut ContactForm, args: &FieldArgs) -> agenda::Result<()> {
    for (field, value) in args.edits() {
        form.set_field(field, value);
    }
    if let Some(message) = form.photo_error() {
        return Err(agenda::Error::InvalidPhoto(message.to_string()));
    }
    if args.no_photo {
        form.remove_photo();
    }
    if let Some(path) = &args.photo {
        let file = PhotoFile::read(path)?;
        form.select_photo(file).map_err(agenda::Error::InvalidPhoto)?;
    }
    Ok(())
}

async fn save(mut form: ContactForm, args: &FieldArgs, repo: &mut ContactRepository) -> agenda::Result<ExitCode> {
    if let Err(e) = apply_fields(&mut form, args) {
        eprintln!("{}", e);
        if form.mode() == FormMode::Create {
            eprintln!("Your entries were kept as a draft; run `agenda add` again to continue.");
        }
        return Ok(ExitCode::FAILURE);
    }
    submit(form, repo).await
}

async fn submit(mut form: ContactForm, repo: &mut ContactRepository) -> agenda::Result<ExitCode> {
    let mut events = repo.subscribe();
    match form.submit(repo).await {
        Ok(contact) => {
            form.unmount()?;
            while let Ok(event) = events.try_recv() {
                log::debug!("Repository event: {:?}", event);
            }
            println!("Saved.");
            print!("{}", view::render_card(&contact));
            Ok(ExitCode::SUCCESS)
        }
        Err(SubmitError::Invalid(errors)) => {
            eprintln!("Please fix the following:");
            eprint!("{}", view::render_field_errors(&errors));
            if form.mode() == FormMode::Create {
                eprintln!("Your entries were kept as a draft; run `agenda add` again to continue.");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(SubmitError::Failed(message)) => {
            eprintln!("{}", message);
            if let Some(detail) = repo.error() {
                eprintln!("  ({})", detail);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn confirm(question: &str, input: &mut impl BufRead) -> std::io::Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn delete(
    repo: &mut ContactRepository,
    id: ContactId,
    yes: bool,
    input: &mut impl BufRead,
) -> agenda::Result<ExitCode> {
    let Some(contact) = repo.contact(id) else {
        eprintln!("No contact with id {}", id);
        return Ok(ExitCode::FAILURE);
    };
    let name = contact.name.clone();
    if !yes && !confirm(&format!("Are you sure you want to delete {}?", name), input)? {
        println!("Kept {}.", name);
        return Ok(ExitCode::SUCCESS);
    }
    println!("Deleting {}...", name);

    let mut events = repo.subscribe();
    repo.delete_contact(id).await?;
    if let Ok(RepositoryEvent::Deleted(deleted)) = events.try_recv() {
        log::info!("Contact {} removed from list", deleted);
    }
    print!("{}", view::render_list(repo));
    Ok(ExitCode::SUCCESS)
}
