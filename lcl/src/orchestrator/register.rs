//! Device registration: credential to persisted key bundle.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::api::{ScnApi, Transport};
use crate::binding;
use crate::credential::CredentialValidator;
use crate::crypto::secrets::SymmetricKey;
use crate::error::Error;
use crate::prompt::Confirm;
use crate::store::{ArtifactStore, KeyBundleStore};

const OVERWRITE_QUESTION: &str =
    "You already have data associated with SCN. Do you want to overwrite it?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterState {
    ReadCredential,
    Validate,
    CheckExistingBundle,
    Bind,
    SendRegistration,
    PersistBundle,
    Done,
}

/// Turns a credential file into a registered device.
///
/// Nothing on disk changes until the service has accepted the registration;
/// an existing bundle is replaced only after the user agreed to it.
pub struct Registrar<'a, T, A> {
    pub validator: &'a dyn CredentialValidator,
    pub confirm: &'a dyn Confirm,
    pub api: &'a ScnApi<T>,
    pub store: &'a KeyBundleStore<A>,
}

impl<'a, T: Transport, A: ArtifactStore> Registrar<'a, T, A> {
    pub async fn run(&self, credential_path: &Path) -> Result<(), Error> {
        enter(RegisterState::ReadCredential);
        let credential = fs::read(credential_path)?;

        enter(RegisterState::Validate);
        let triple = self.validator.validate(&credential)?;

        enter(RegisterState::CheckExistingBundle);
        if self.store.exists() {
            if !self.confirm.confirm(OVERWRITE_QUESTION)? {
                info!("registration cancelled; existing bundle kept");
                return Err(Error::UserCancelled);
            }
            debug!("existing bundle will be replaced");
        }

        enter(RegisterState::Bind);
        let binding = binding::bind(triple)?;

        enter(RegisterState::SendRegistration);
        self.api.register(&binding.record).await?;

        enter(RegisterState::PersistBundle);
        let key = SymmetricKey::generate();
        self.store.save(&binding.bundle, &key)?;

        enter(RegisterState::Done);
        Ok(())
    }
}

fn enter(state: RegisterState) {
    debug!(?state, "registration");
}
