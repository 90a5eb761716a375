use crate::{
    app::AppBackend,
    cli::{
        errors::{CliError, CliResult},
        validation::*,
        ActionArgs, SemanticArgs,
    },
    contacts::{Contact, ContactCreate, ContactUpdate, SearchQuery, Sheet},
};

fn sheet_of(repeating: bool) -> Sheet {
    if repeating {
        Sheet::Repeating
    } else {
        Sheet::Primary
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Ask a yes/no question, `false` on "no".
fn confirm(message: &str) -> CliResult<bool> {
    Ok(inquire::prompt_confirmation(message)?)
}

/// Command for searching contacts
#[derive(Debug, Clone)]
pub struct SearchCommand {
    pub query: SearchQuery,
    pub sheet: Sheet,
    pub count_only: bool,
    pub action: Option<ActionArgs>,
}

/// Parameters for creating a search command
#[derive(Debug, Clone, Default)]
pub struct SearchCommandParams {
    pub name: Option<String>,
    pub number: Option<String>,
    pub keyword: Option<String>,
    pub id: Option<u64>,
    pub exact: bool,
    pub count: bool,
    pub repeating: bool,
    pub action: Option<ActionArgs>,
}

impl SearchCommand {
    pub fn new(params: SearchCommandParams) -> CliResult<Self> {
        if let Some(name) = &params.name {
            if name.chars().count() > 200 {
                return Err(CliError::validation("name", "Search text is too long"));
            }
        }

        let query = SearchQuery {
            id: params.id,
            name: params.name,
            number: params.number,
            keyword: params.keyword,
            exact: params.exact,
            limit: None,
        };

        Ok(Self {
            query,
            sheet: sheet_of(params.repeating),
            count_only: params.count,
            action: params.action,
        })
    }

    pub fn execute(self, app: &dyn AppBackend) -> CliResult<()> {
        let contacts = app.search(self.sheet, self.query.clone())?;

        if self.count_only {
            println!("{} contacts found", contacts.len());
            return Ok(());
        }

        match self.action {
            None => print_json(&contacts),
            Some(_) if contacts.is_empty() => {
                println!("0 items affected");
                Ok(())
            }
            Some(action) => ActionCommand::from(action).execute(contacts, self.query, self.sheet, app),
        }
    }
}

/// Command for actions on search results
#[derive(Debug, Clone)]
pub enum ActionCommand {
    Update {
        name: Option<String>,
        number: Option<String>,
    },
    Delete {
        yes: bool,
        force: bool,
    },
}

impl From<ActionArgs> for ActionCommand {
    fn from(action: ActionArgs) -> Self {
        match action {
            ActionArgs::Update { name, number } => ActionCommand::Update { name, number },
            ActionArgs::Delete { yes, force } => ActionCommand::Delete { yes, force },
        }
    }
}

impl ActionCommand {
    pub fn execute(
        self,
        contacts: Vec<Contact>,
        query: SearchQuery,
        sheet: Sheet,
        app: &dyn AppBackend,
    ) -> CliResult<()> {
        let is_entire_sheet = query.is_empty();

        match self {
            ActionCommand::Update { name, number } => {
                validate_contact_update(&name, &number)?;

                let contact_update = ContactUpdate { name, number };
                if contact_update.is_empty() {
                    println!("This update request does nothing");
                    return Ok(());
                }

                if is_entire_sheet
                    && !confirm(&format!(
                        "You are about to update every single contact ({} items). Are you really sure?",
                        contacts.len()
                    ))?
                {
                    return Ok(());
                }

                let count = app.search_update(sheet, query, contact_update)?;
                println!("{count} items updated");
                Ok(())
            }
            ActionCommand::Delete { yes, force } => {
                if !yes
                    && !confirm(&format!(
                        "Are you sure you want to delete {} contacts?",
                        contacts.len()
                    ))?
                {
                    return Ok(());
                }

                if is_entire_sheet
                    && !force
                    && !confirm(&format!(
                        "You are about to wipe the entire {sheet} sheet. Are you really sure?"
                    ))?
                {
                    return Ok(());
                }

                let count = app.search_delete(sheet, query)?;
                println!("{count} items removed");
                Ok(())
            }
        }
    }
}

/// Command for adding contacts
#[derive(Debug, Clone)]
pub struct AddCommand {
    pub name: Option<String>,
    pub number: Option<String>,
}

impl AddCommand {
    pub fn new(name: Option<String>, number: Option<String>) -> CliResult<Self> {
        validate_contact_update(&name, &number)?;
        Ok(Self { name, number })
    }

    pub fn execute(self, app: &dyn AppBackend) -> CliResult<()> {
        let name = match self.name {
            Some(name) => name,
            None => inquire::Text::new("Name").prompt()?,
        };
        let number = match self.number {
            Some(number) => number,
            None => inquire::Text::new("Number").prompt()?,
        };

        validate_contact(&name, &number)?;

        let outcome = app.add(ContactCreate { name, number })?;

        match outcome.sheet {
            Sheet::Primary => println!("Contact added successfully!"),
            Sheet::Repeating => {
                println!("This number already exists. Contact added to the repeating sheet!")
            }
        }

        print_json(&outcome.contact)
    }
}

/// Command for editing a contact found by number
#[derive(Debug, Clone)]
pub struct EditCommand {
    pub number: String,
    pub update: ContactUpdate,
}

impl EditCommand {
    pub fn new(number: String, name: Option<String>, new_number: Option<String>) -> CliResult<Self> {
        validate_contact_update(&name, &new_number)?;

        let update = ContactUpdate {
            name,
            number: new_number,
        };
        if update.is_empty() {
            return Err(CliError::invalid_input(
                "nothing to change, pass --name and/or --new-number",
            ));
        }

        Ok(Self { number, update })
    }

    pub fn execute(self, app: &dyn AppBackend) -> CliResult<()> {
        let contact = app
            .find_by_number(&self.number)?
            .ok_or(CliError::NotFound {
                number: self.number.clone(),
            })?;

        let contact = app.update(contact.id, self.update)?;

        println!("Contact updated successfully!");
        print_json(&contact)
    }
}

/// Command for deleting a contact found by number
#[derive(Debug, Clone)]
pub struct DeleteCommand {
    pub number: String,
    pub yes: bool,
}

impl DeleteCommand {
    pub fn execute(self, app: &dyn AppBackend) -> CliResult<()> {
        let contact = app
            .find_by_number(&self.number)?
            .ok_or(CliError::NotFound {
                number: self.number.clone(),
            })?;

        if !self.yes
            && !confirm(&format!(
                "Delete {} ({})?",
                contact.name, contact.number
            ))?
        {
            return Ok(());
        }

        app.delete(Sheet::Primary, contact.id)?;

        println!("Contact deleted successfully!");
        Ok(())
    }
}

pub fn list(app: &dyn AppBackend, repeating: bool) -> CliResult<()> {
    let contacts = app.list_sorted(sheet_of(repeating))?;
    print_json(&contacts)
}

pub fn export(app: &dyn AppBackend, dest: &str, repeating: bool) -> CliResult<()> {
    let sheet = sheet_of(repeating);
    let count = app.export(sheet, dest)?;
    println!("{count} {sheet} contacts written to {dest}");
    Ok(())
}

pub fn semantic(app: &dyn AppBackend, action: SemanticArgs) -> CliResult<()> {
    match action {
        SemanticArgs::Query {
            text,
            limit,
            threshold,
        } => {
            validate_threshold(threshold)?;
            if text.trim().is_empty() {
                return Err(CliError::validation("text", "Query cannot be empty"));
            }

            let results = app.semantic_search(&text, limit, threshold)?;
            print_json(&results)
        }
        SemanticArgs::Reindex {} => {
            let count = app.reindex(true)?;
            println!("{count} contacts indexed");
            Ok(())
        }
    }
}
