//! Database bootstrap commands — `leadcrm init-db`, `leadcrm create-user`.

use anyhow::{Result, bail};
use leadcrm::config::CrmConfig;
use leadcrm::crm::forms::AccountForm;
use leadcrm::crm::server::open_database;

pub fn cmd_init_db(config: &CrmConfig) -> Result<()> {
    open_database(config)?;
    println!("Database initialized at {}", config.database.path.display());
    Ok(())
}

/// Account details collected from the command line.
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub organisor: bool,
    pub superuser: bool,
}

pub fn cmd_create_user(config: &CrmConfig, account: NewAccount) -> Result<()> {
    let form = AccountForm {
        username: Some(account.username),
        email: Some(account.email),
        first_name: Some(account.first_name),
        last_name: Some(account.last_name),
        password1: Some(account.password.clone()),
        password2: Some(account.password),
    };
    let fields = match form.validate(true) {
        Ok(fields) => fields,
        Err(errors) => {
            let details: Vec<String> = errors
                .iter()
                .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
                .collect();
            bail!("Invalid account: {}", details.join("; "));
        }
    };

    let db = open_database(config)?;
    if db.username_taken(&fields.username, None)? {
        bail!("User '{}' already exists", fields.username);
    }
    let user = db.create_user(&fields, account.organisor, false, account.superuser)?;
    println!("Created user '{}' (id {})", user.username, user.id);
    Ok(())
}
