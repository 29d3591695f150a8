use std::path::PathBuf;

use agenda::core::contact::ContactId;
use agenda::core::validate::Field;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "agenda")]
#[command(about = "Manage contacts stored in a remote agenda", long_about = None)]
#[command(
    after_help = "Environment:\n  AGENDA_API_URL   Agenda API base URL\n  AGENDA_SLUG      Agenda to use\n  AGENDA_DEBUG     Debug logging to the journal"
)]
pub struct Args {
    /// Log at debug level
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show all contacts (default)
    List,
    /// Create a contact, resuming any saved draft
    Add(FieldArgs),
    /// Replace a contact's fields
    Edit {
        id: ContactId,
        #[command(flatten)]
        fields: FieldArgs,
    },
    /// Delete a contact and its photo
    Delete {
        id: ContactId,
        /// Skip the confirmation prompt
        #[arg(short, long, default_value_t = false)]
        yes: bool,
    },
    /// Show or discard the saved draft
    Draft {
        #[arg(long, default_value_t = false)]
        discard: bool,
    },
}

/// Field edits given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, clap::Args)]
pub struct FieldArgs {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    /// Image file to upload with the contact
    #[arg(long, conflicts_with_all = ["photo_url", "no_photo"])]
    pub photo: Option<PathBuf>,
    /// Use an image that is already hosted
    #[arg(long, conflicts_with = "no_photo")]
    pub photo_url: Option<String>,
    /// Remove the current photo
    #[arg(long, default_value_t = false)]
    pub no_photo: bool,
}

impl FieldArgs {
    /// Text edits in form order.
    pub fn edits(&self) -> Vec<(Field, &str)> {
        [
            (Field::Name, &self.name),
            (Field::Email, &self.email),
            (Field::Phone, &self.phone),
            (Field::Address, &self.address),
            (Field::Photo, &self.photo_url),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("agenda").chain(argv.iter().copied()))
    }

    #[test]
    fn no_command_means_list() {
        let parsed = parse(&[]).unwrap();
        assert!(!parsed.debug);
        assert_eq!(parsed.command, None);

        let parsed = parse(&["list", "--debug"]).unwrap();
        assert!(parsed.debug);
        assert_eq!(parsed.command, Some(Command::List));
    }

    #[test]
    fn add_collects_fields() {
        let parsed = parse(&["add", "--name", "Ada", "--phone", "+1 (555) 123-4567", "--photo", "ada.png"]).unwrap();
        let Some(Command::Add(fields)) = parsed.command else {
            panic!("unexpected command {:?}", parsed.command);
        };
        assert_eq!(
            fields.edits(),
            vec![(Field::Name, "Ada"), (Field::Phone, "+1 (555) 123-4567")]
        );
        assert_eq!(fields.photo, Some(PathBuf::from("ada.png")));
        assert!(!fields.no_photo);
    }

    #[test]
    fn hosted_photo_url_is_a_photo_edit() {
        let parsed = parse(&["edit", "3", "--photo-url", "https://img.example/a.jpg"]).unwrap();
        let Some(Command::Edit { id, fields }) = parsed.command else {
            panic!("unexpected command {:?}", parsed.command);
        };
        assert_eq!(id, ContactId(3));
        assert_eq!(fields.edits(), vec![(Field::Photo, "https://img.example/a.jpg")]);
    }

    #[test]
    fn edit_and_delete_need_ids() {
        assert_eq!(parse(&["edit"]).unwrap_err().kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(parse(&["delete", "abc"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(
            parse(&["delete", "12"]).unwrap().command,
            Some(Command::Delete { id: ContactId(12), yes: false })
        );
        assert_eq!(
            parse(&["delete", "12", "-y"]).unwrap().command,
            Some(Command::Delete { id: ContactId(12), yes: true })
        );
    }

    #[test]
    fn bad_options_are_rejected() {
        assert!(parse(&["add", "--name"]).is_err());
        assert_eq!(parse(&["add", "--nickname", "x"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
        assert!(parse(&["frobnicate"]).is_err());
        assert_eq!(
            parse(&["add", "--photo", "a.png", "--no-photo"]).unwrap_err().kind(),
            ErrorKind::ArgumentConflict
        );
        assert_eq!(
            parse(&["draft", "--discard"]).unwrap().command,
            Some(Command::Draft { discard: true })
        );
    }
}
