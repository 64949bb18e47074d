use commune_core::models::UserProfile;
use commune_core::remote::RemoteStore;

use crate::commands::common::{open_session, SessionOptions};
use crate::config_profiles::{normalize_profile_name, normalize_text_option, CliProfilesConfig};
use crate::error::CliError;

/// Fields changed by `commune profile set`; `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub user_id: Option<String>,
    pub turso_database_url: Option<String>,
    pub turso_auth_token: Option<String>,
    pub activate: bool,
}

pub fn apply_profile_update(
    config: &mut CliProfilesConfig,
    profile_name: &str,
    update: ProfileUpdate,
) -> Result<(), CliError> {
    let profile = config.profile_mut_or_default(profile_name);
    if let Some(user_id) = normalize_text_option(update.user_id) {
        profile.user_id = Some(user_id);
    }
    if let Some(url) = normalize_text_option(update.turso_database_url) {
        profile.turso_database_url = Some(url);
    }
    if let Some(token) = normalize_text_option(update.turso_auth_token) {
        profile.turso_auth_token = Some(token);
    }

    if let Some(client_config) = profile.client_config(None) {
        client_config.validate()?;
    }

    if update.activate || config.active_profile.is_none() {
        config.active_profile = Some(profile_name.to_string());
    }
    Ok(())
}

pub async fn run_profile_set(
    options: &SessionOptions,
    name: Option<&str>,
    display_name: Option<&str>,
    update: ProfileUpdate,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load()?;
    let profile_name = normalize_profile_name(name)
        .unwrap_or_else(|| config.resolve_profile_name(options.profile.as_deref()));

    apply_profile_update(&mut config, &profile_name, update)?;
    let path = config.save()?;
    println!("Saved profile '{profile_name}' to {}", path.display());

    if let Some(display_name) = normalize_text_option(display_name.map(str::to_string)) {
        let session = open_session(&SessionOptions {
            profile: Some(profile_name),
            ..options.clone()
        })
        .await?;
        session
            .remote()
            .put_profile(&UserProfile::new(session.user_id(), display_name.as_str()))
            .await?;
        println!("Published display name '{display_name}'");
    }
    Ok(())
}
