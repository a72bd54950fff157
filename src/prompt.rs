use std::io;

use dialoguer::{Input, Select, theme::ColorfulTheme};

use crate::{
    apis::v1alpha1::SecretParam,
    error::{Error, Result},
};

/// Interactive question driver.
pub trait Prompt {
    /// Ask for free text; an empty answer is allowed.
    fn ask_string(&mut self, prompt: &str) -> Result<String>;

    /// Ask to pick one of `options` and return the chosen option.
    fn ask_select(&mut self, prompt: &str, options: &[&str]) -> Result<String>;

    /// Ask which key of which secret holds `field_name`.
    fn ask_secret(&mut self, field_name: &str) -> Result<SecretParam> {
        let secret_key = self.ask_string(&format!("Secret Key for {field_name} :"))?;
        let secret_name = self.ask_string(&format!("Secret Name for {field_name} :"))?;
        Ok(SecretParam {
            field_name: field_name.to_string(),
            secret_key,
            secret_name,
        })
    }
}

/// Terminal prompts rendered with `dialoguer`.
pub struct DialoguerPrompt {
    theme: ColorfulTheme,
}

impl Default for DialoguerPrompt {
    fn default() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

fn from_dialoguer(err: dialoguer::Error) -> Error {
    match err {
        dialoguer::Error::IO(err) if err.kind() == io::ErrorKind::Interrupted => Error::Interrupted,
        dialoguer::Error::IO(err) => Error::Prompt(err),
    }
}

impl Prompt for DialoguerPrompt {
    fn ask_string(&mut self, prompt: &str) -> Result<String> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(from_dialoguer)
    }

    fn ask_select(&mut self, prompt: &str, options: &[&str]) -> Result<String> {
        let selected = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(options)
            .default(0)
            .interact_opt()
            .map_err(from_dialoguer)?;
        // Esc or `q` leaves the select without a choice.
        let index = selected.ok_or(Error::Interrupted)?;
        options
            .get(index)
            .map(|option| option.to_string())
            .ok_or(Error::Interrupted)
    }
}
