// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Per token persistent database.
//!
//! The `token.db.<N>` item holds the token main state followed by the
//! manifest of persistent objects: `{count: u32, uuid: [[u8; 16]; count]}`.
//! Each persistent object is stored in its own item, named after the
//! hexadecimal form of its UUID, and holds the serialized attribute list.
//!
//! PINs are never stored in clear: they are zero padded to the maximum PIN
//! size and encrypted with AES-128-CBC under a per user key kept in its own
//! storage item.

use std::sync::Arc;

use crate::error::Result;
use crate::get_random_data;
use crate::pkcs11::*;
use crate::storage::SecureStorage;

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use constant_time_eq::constant_time_eq;
use uuid::Uuid;
use zeroize::Zeroizing;

pub const PIN_SIZE: usize = SKS_TOKEN_PIN_SIZE_MAX;
const PIN_KEY_SIZE: usize = 16;
const UUID_SIZE: usize = 16;

/* main_state layout */
const LABEL_OFFSET: usize = 0;
const FLAGS_OFFSET: usize = LABEL_OFFSET + SKS_TOKEN_LABEL_SIZE;
const SO_PIN_OFFSET: usize = FLAGS_OFFSET + 4;
const USER_PIN_OFFSET: usize = SO_PIN_OFFSET + PIN_STATE_SIZE;
const PIN_STATE_SIZE: usize = PIN_SIZE + 4 + 4;
pub const MAIN_STATE_SIZE: usize = USER_PIN_OFFSET + PIN_STATE_SIZE;

/// Failed attempts after which a PIN is reported as being on its last try
pub const PIN_FINAL_TRY_COUNT: u32 = 6;
/// Failed attempts after which a PIN is locked
pub const PIN_MAX_COUNT: u32 = 7;

/// A user class owning a PIN
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinUser {
    SO,
    User,
}

impl PinUser {
    fn index(self) -> u32 {
        match self {
            PinUser::SO => CKU_SO,
            PinUser::User => CKU_USER,
        }
    }

    pub fn count_low(self) -> CK_FLAGS {
        match self {
            PinUser::SO => CKF_SO_PIN_COUNT_LOW,
            PinUser::User => CKF_USER_PIN_COUNT_LOW,
        }
    }

    pub fn final_try(self) -> CK_FLAGS {
        match self {
            PinUser::SO => CKF_SO_PIN_FINAL_TRY,
            PinUser::User => CKF_USER_PIN_FINAL_TRY,
        }
    }

    pub fn locked(self) -> CK_FLAGS {
        match self {
            PinUser::SO => CKF_SO_PIN_LOCKED,
            PinUser::User => CKF_USER_PIN_LOCKED,
        }
    }

    pub fn to_be_changed(self) -> CK_FLAGS {
        match self {
            PinUser::SO => CKF_SO_PIN_TO_BE_CHANGED,
            PinUser::User => CKF_USER_PIN_TO_BE_CHANGED,
        }
    }

    /// The flag marking a PIN of this class as set
    fn initialized(self) -> CK_FLAGS {
        match self {
            PinUser::SO => CKF_TOKEN_INITIALIZED,
            PinUser::User => CKF_USER_PIN_INITIALIZED,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PinState {
    pub pin: [u8; PIN_SIZE],
    pub size: u32,
    pub count: u32,
}

impl PinState {
    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.pin);
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
    }

    fn parse(buf: &[u8]) -> PinState {
        let mut state = PinState::default();
        state.pin.copy_from_slice(&buf[..PIN_SIZE]);
        state.size = le_u32(&buf[PIN_SIZE..]);
        state.count = le_u32(&buf[PIN_SIZE + 4..]);
        state
    }
}

fn le_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// The persistent state of a token
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MainState {
    pub label: [u8; SKS_TOKEN_LABEL_SIZE],
    pub flags: CK_FLAGS,
    pub so: PinState,
    pub user: PinState,
}

impl MainState {
    fn new_token() -> MainState {
        MainState {
            label: [b'*'; SKS_TOKEN_LABEL_SIZE],
            flags: CKF_SO_PIN_TO_BE_CHANGED
                | CKF_USER_PIN_TO_BE_CHANGED
                | CKF_RNG
                | CKF_DUAL_CRYPTO_OPERATIONS
                | CKF_LOGIN_REQUIRED,
            so: PinState::default(),
            user: PinState::default(),
        }
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.label);
        out.extend_from_slice(&self.flags.to_le_bytes());
        self.so.serialize(out);
        self.user.serialize(out);
    }

    fn parse(buf: &[u8]) -> MainState {
        let mut label = [0u8; SKS_TOKEN_LABEL_SIZE];
        label.copy_from_slice(&buf[LABEL_OFFSET..FLAGS_OFFSET]);
        MainState {
            label: label,
            flags: le_u32(&buf[FLAGS_OFFSET..]),
            so: PinState::parse(&buf[SO_PIN_OFFSET..]),
            user: PinState::parse(&buf[USER_PIN_OFFSET..]),
        }
    }

    pub fn pin(&self, user: PinUser) -> &PinState {
        match user {
            PinUser::SO => &self.so,
            PinUser::User => &self.user,
        }
    }

    fn pin_mut(&mut self, user: PinUser) -> &mut PinState {
        match user {
            PinUser::SO => &mut self.so,
            PinUser::User => &mut self.user,
        }
    }
}

#[derive(Debug)]
pub struct PersistentDb {
    token_id: u32,
    storage: Arc<dyn SecureStorage>,
    main: MainState,
    objects: Vec<Uuid>,
}

fn object_name(uuid: &Uuid) -> String {
    uuid.as_simple().to_string()
}

impl PersistentDb {
    /// Opens the database of a token, creating a fresh one on first use.
    pub fn open(
        storage: Arc<dyn SecureStorage>,
        token_id: u32,
    ) -> Result<PersistentDb> {
        let mut db = PersistentDb {
            token_id: token_id,
            storage: storage,
            main: MainState::new_token(),
            objects: Vec::new(),
        };
        match db.storage.read(&db.db_name()) {
            Ok(data) => {
                db.load(&data)?;
                db.check_pin_keys()?;
            }
            Err(e) if e.is_not_found() => {
                info!("Creating database for token {}", token_id);
                db.init_pin_keys()?;
                db.storage.create(&db.db_name(), &db.serialize())?;
            }
            Err(e) => return Err(e),
        }
        Ok(db)
    }

    fn load(&mut self, data: &[u8]) -> Result<()> {
        if data.len() < MAIN_STATE_SIZE + 4 {
            error!("Token {} database is truncated", self.token_id);
            return Err(CKR_GENERAL_ERROR)?;
        }
        self.main = MainState::parse(&data[..MAIN_STATE_SIZE]);
        let count = le_u32(&data[MAIN_STATE_SIZE..]) as usize;
        let uuids = &data[MAIN_STATE_SIZE + 4..];
        if uuids.len() != count * UUID_SIZE {
            error!(
                "Token {} manifest: {} entries, {} bytes",
                self.token_id,
                count,
                uuids.len()
            );
            return Err(CKR_GENERAL_ERROR)?;
        }
        self.objects = uuids
            .chunks_exact(UUID_SIZE)
            .map(|c| {
                let mut b = [0u8; UUID_SIZE];
                b.copy_from_slice(c);
                Uuid::from_bytes(b)
            })
            .collect();
        debug!(
            "Token {} loaded with {} persistent object(s)",
            self.token_id,
            self.objects.len()
        );
        Ok(())
    }

    fn db_name(&self) -> String {
        format!("token.db.{}", self.token_id)
    }

    fn pin_key_name(&self, user: PinUser) -> String {
        format!("token.db.{}-pin{}", self.token_id, user.index())
    }

    /// Stored PINs are only readable with the keys they were stored
    /// with, so an existing database without them is unusable.
    fn check_pin_keys(&self) -> Result<()> {
        for user in [PinUser::SO, PinUser::User] {
            if !self.storage.exists(&self.pin_key_name(user))? {
                error!(
                    "Token {}: PIN key {} is missing",
                    self.token_id,
                    user.index()
                );
                return Err(CKR_GENERAL_ERROR)?;
            }
        }
        Ok(())
    }

    fn init_pin_keys(&self) -> Result<()> {
        for user in [PinUser::SO, PinUser::User] {
            let name = self.pin_key_name(user);
            if self.storage.exists(&name)? {
                continue;
            }
            let mut key = Zeroizing::new([0u8; PIN_KEY_SIZE]);
            get_random_data(key.as_mut())?;
            self.storage.create(&name, key.as_ref())?;
        }
        Ok(())
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            MAIN_STATE_SIZE + 4 + self.objects.len() * UUID_SIZE,
        );
        self.main.serialize(&mut out);
        out.extend_from_slice(&(self.objects.len() as u32).to_le_bytes());
        for uuid in &self.objects {
            out.extend_from_slice(uuid.as_bytes());
        }
        out
    }

    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    pub fn main(&self) -> &MainState {
        &self.main
    }

    pub fn main_mut(&mut self) -> &mut MainState {
        &mut self.main
    }

    pub fn flags(&self) -> CK_FLAGS {
        self.main.flags
    }

    /// Writes the main state and manifest back to storage
    pub fn update(&self) -> Result<()> {
        self.storage.write(&self.db_name(), &self.serialize())
    }

    /// UUIDs of all the registered persistent objects
    pub fn objects(&self) -> &[Uuid] {
        &self.objects
    }

    /// Appends an object to the manifest. On failure the manifest is
    /// left unchanged.
    pub fn register_object(&mut self, uuid: &Uuid) -> Result<()> {
        if self.objects.contains(uuid) {
            panic!("Duplicate persistent object UUID {}", uuid);
        }
        self.objects.push(*uuid);
        if let Err(e) = self.update() {
            error!("Failed to register object {}: {}", uuid, e);
            self.objects.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Removes an object from the manifest. On failure the manifest is
    /// left unchanged.
    pub fn unregister_object(&mut self, uuid: &Uuid) -> Result<()> {
        let idx = match self.objects.iter().rposition(|u| u == uuid) {
            Some(i) => i,
            None => return err_not_found!(uuid.to_string()),
        };
        self.objects.remove(idx);
        if let Err(e) = self.update() {
            error!("Failed to unregister object {}: {}", uuid, e);
            self.objects.insert(idx, *uuid);
            return Err(e);
        }
        Ok(())
    }

    pub fn create_object_blob(&self, uuid: &Uuid, data: &[u8]) -> Result<()> {
        self.storage.create(&object_name(uuid), data)
    }

    pub fn read_object_blob(&self, uuid: &Uuid) -> Result<Vec<u8>> {
        self.storage.read(&object_name(uuid))
    }

    pub fn remove_object_blob(&self, uuid: &Uuid) -> Result<()> {
        self.storage.remove(&object_name(uuid))
    }

    /// Encrypts a PIN under the key of its user class
    pub fn cipher_pin(
        &self,
        user: PinUser,
        pin: &[u8],
    ) -> Result<[u8; PIN_SIZE]> {
        if pin.len() > PIN_SIZE {
            return Err(CKR_PIN_LEN_RANGE)?;
        }
        let key = Zeroizing::new(self.storage.read(&self.pin_key_name(user))?);
        if key.len() != PIN_KEY_SIZE {
            error!("Invalid PIN key for token {}", self.token_id);
            return Err(CKR_GENERAL_ERROR)?;
        }
        let cipher = Aes128::new(GenericArray::from_slice(&key));
        let mut buf = Zeroizing::new([0u8; PIN_SIZE]);
        buf[..pin.len()].copy_from_slice(pin);
        /* CBC with a zero IV */
        let mut chain = [0u8; 16];
        for block in buf.chunks_exact_mut(16) {
            for (b, c) in block.iter_mut().zip(chain.iter()) {
                *b ^= *c;
            }
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
            chain.copy_from_slice(block);
        }
        Ok(*buf)
    }

    fn pin_matches(&self, user: PinUser, pin: &[u8]) -> Result<bool> {
        let cipher = self.cipher_pin(user, pin)?;
        let state = self.main.pin(user);
        let size_ok = state.size as usize == pin.len();
        Ok(constant_time_eq(&cipher, &state.pin) && size_ok)
    }

    /// Compares a PIN with the stored one and updates the try counter
    /// and the related token flags accordingly. Returns whether the PIN
    /// matched.
    pub fn verify_pin(&mut self, user: PinUser, pin: &[u8]) -> Result<bool> {
        let matched = match self.pin_matches(user, pin) {
            Ok(m) => m,
            Err(e) if e.rv() == CKR_PIN_LEN_RANGE => false,
            Err(e) => return Err(e),
        };
        if matched {
            let state = self.main.pin_mut(user);
            let dirty = state.count != 0;
            state.count = 0;
            let mask = user.count_low() | user.final_try();
            let dirty = dirty || self.main.flags & mask != 0;
            self.main.flags &= !mask;
            if dirty {
                self.update()?;
            }
            return Ok(true);
        }

        self.main.flags |= user.count_low();
        let state = self.main.pin_mut(user);
        if state.count < PIN_MAX_COUNT {
            state.count += 1;
        }
        let count = state.count;
        if count >= PIN_FINAL_TRY_COUNT {
            self.main.flags |= user.final_try();
        }
        if count >= PIN_MAX_COUNT {
            self.main.flags |= user.locked();
        }
        warn!("Wrong PIN for token {}: {} failed try(s)", self.token_id, count);
        self.update()?;
        Ok(false)
    }

    /// Verifies the PIN of a user class for login purposes
    pub fn check_pin(&mut self, user: PinUser, pin: &[u8]) -> Result<()> {
        if self.main.pin(user).size == 0
            || self.main.flags & user.initialized() == 0
        {
            return Err(CKR_USER_PIN_NOT_INITIALIZED)?;
        }
        if self.main.flags & user.locked() != 0 {
            return Err(CKR_PIN_LOCKED)?;
        }
        if self.verify_pin(user, pin)? {
            return Ok(());
        }
        if self.main.flags & user.locked() != 0 {
            Err(CKR_PIN_LOCKED)?
        } else {
            Err(CKR_PIN_INCORRECT)?
        }
    }

    /// Stores a new PIN for a user class and resets its counters
    pub fn set_pin(&mut self, user: PinUser, pin: &[u8]) -> Result<()> {
        let cipher = self.cipher_pin(user, pin)?;
        let state = self.main.pin_mut(user);
        state.pin = cipher;
        state.size = pin.len() as u32;
        state.count = 0;
        self.main.flags &= !(user.count_low()
            | user.final_try()
            | user.locked()
            | user.to_be_changed());
        if user == PinUser::User {
            self.main.flags |= CKF_USER_PIN_INITIALIZED;
        }
        self.update()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn new_db(storage: &MemoryStorage) -> PersistentDb {
        PersistentDb::open(Arc::new(storage.clone()), 0).unwrap()
    }

    #[test]
    fn fresh_database() {
        let storage = MemoryStorage::new();
        let db = new_db(&storage);
        assert_eq!(MAIN_STATE_SIZE, 116);
        assert_eq!(db.main().label, [b'*'; 32]);
        assert_eq!(
            db.flags(),
            CKF_SO_PIN_TO_BE_CHANGED
                | CKF_USER_PIN_TO_BE_CHANGED
                | CKF_RNG
                | CKF_DUAL_CRYPTO_OPERATIONS
                | CKF_LOGIN_REQUIRED
        );
        let data = storage.read("token.db.0").unwrap();
        assert_eq!(data.len(), MAIN_STATE_SIZE + 4);
        assert!(storage.exists("token.db.0-pin0").unwrap());
        assert!(storage.exists("token.db.0-pin1").unwrap());
    }

    #[test]
    fn manifest_persistence() {
        let storage = MemoryStorage::new();
        let mut db = new_db(&storage);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.register_object(&a).unwrap();
        db.register_object(&b).unwrap();
        db.unregister_object(&a).unwrap();
        assert!(db.unregister_object(&a).unwrap_err().is_not_found());

        let reopened = new_db(&storage);
        assert_eq!(reopened.objects(), &[b]);
    }

    #[test]
    fn truncated_database() {
        let storage = MemoryStorage::new();
        let mut db = new_db(&storage);
        db.register_object(&Uuid::new_v4()).unwrap();
        let mut data = storage.read("token.db.0").unwrap();
        data.truncate(data.len() - 3);
        storage.write("token.db.0", &data).unwrap();
        let err =
            PersistentDb::open(Arc::new(storage.clone()), 0).unwrap_err();
        assert_eq!(err.rv(), CKR_GENERAL_ERROR);
    }

    #[test]
    fn missing_pin_key() {
        let storage = MemoryStorage::new();
        let mut db = new_db(&storage);
        db.set_pin(PinUser::SO, b"12345678").unwrap();
        storage.remove("token.db.0-pin0").unwrap();

        /* no new key is made up for an existing database */
        let err =
            PersistentDb::open(Arc::new(storage.clone()), 0).unwrap_err();
        assert_eq!(err.rv(), CKR_GENERAL_ERROR);
        assert!(!storage.exists("token.db.0-pin0").unwrap());
    }

    #[test]
    #[should_panic]
    fn duplicate_registration() {
        let storage = MemoryStorage::new();
        let mut db = new_db(&storage);
        let a = Uuid::new_v4();
        db.register_object(&a).unwrap();
        let _ = db.register_object(&a);
    }

    #[test]
    fn pin_counters() {
        let storage = MemoryStorage::new();
        let mut db = new_db(&storage);
        db.main_mut().flags |= CKF_TOKEN_INITIALIZED;
        db.set_pin(PinUser::SO, b"12345678").unwrap();
        assert_ne!(db.main().so.pin[..8], b"12345678"[..]);

        db.check_pin(PinUser::SO, b"12345678").unwrap();
        assert_eq!(
            db.check_pin(PinUser::User, b"12345678").unwrap_err().rv(),
            CKR_USER_PIN_NOT_INITIALIZED
        );

        for n in 1..PIN_MAX_COUNT {
            let err = db.check_pin(PinUser::SO, b"bad pin").unwrap_err();
            assert_eq!(err.rv(), CKR_PIN_INCORRECT);
            assert_eq!(db.main().so.count, n);
            assert_ne!(db.flags() & CKF_SO_PIN_COUNT_LOW, 0);
        }
        assert_ne!(db.flags() & CKF_SO_PIN_FINAL_TRY, 0);
        let err = db.check_pin(PinUser::SO, b"bad pin").unwrap_err();
        assert_eq!(err.rv(), CKR_PIN_LOCKED);
        assert_ne!(db.flags() & CKF_SO_PIN_LOCKED, 0);
        let err = db.check_pin(PinUser::SO, b"12345678").unwrap_err();
        assert_eq!(err.rv(), CKR_PIN_LOCKED);
        assert_eq!(db.main().so.count, PIN_MAX_COUNT);

        /* counters survive a reload */
        let reopened = new_db(&storage);
        assert_eq!(reopened.main(), db.main());
    }

    #[test]
    fn pin_reset_on_success() {
        let storage = MemoryStorage::new();
        let mut db = new_db(&storage);
        db.set_pin(PinUser::User, b"userpin1").unwrap();
        assert_ne!(db.flags() & CKF_USER_PIN_INITIALIZED, 0);
        assert!(db.check_pin(PinUser::User, b"userpin").is_err());
        assert_eq!(db.main().user.count, 1);
        db.check_pin(PinUser::User, b"userpin1").unwrap();
        assert_eq!(db.main().user.count, 0);
        assert_eq!(db.flags() & CKF_USER_PIN_COUNT_LOW, 0);
    }
}
