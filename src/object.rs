// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Object manager.
//!
//! Session objects live in the session that created them, token
//! objects in their token, which also persists them. Clients only see
//! handles minted by the session directory (see [`crate::handle`]).

use crate::attribute::Attributes;
use crate::entry::Output;
use crate::error::Result;
use crate::helpers::*;
use crate::persistent::PersistentDb;
use crate::pkcs11::vendor::*;
use crate::pkcs11::*;
use crate::policy::*;
use crate::processing::asymm::BackendKey;
use crate::serializer::{SerialArgs, Serializer};
use crate::session::{FindContext, ObjRef, Session};
use crate::ta::{ClientId, Ta};
use crate::token::Token;

use uuid::Uuid;

pub type ObjectId = u64;

#[derive(Debug)]
pub struct Object {
    attributes: Option<Attributes>,
    uuid: Option<Uuid>,
    key: Option<BackendKey>,
}

impl Object {
    pub fn new(attributes: Attributes) -> Object {
        Object {
            attributes: Some(attributes),
            uuid: None,
            key: None,
        }
    }

    /// A persistent object whose attributes have not been read yet
    pub fn persistent(uuid: Uuid) -> Object {
        Object {
            attributes: None,
            uuid: Some(uuid),
            key: None,
        }
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        self.attributes.as_ref()
    }

    pub fn uuid(&self) -> Option<&Uuid> {
        self.uuid.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.attributes.is_some()
    }

    /// Reads the attributes of a persistent object from storage.
    ///
    /// A blob that cannot be read or parsed leaves the object unloaded
    /// and unusable.
    pub fn load(&mut self, db: &PersistentDb) -> Result<&Attributes> {
        if self.attributes.is_none() {
            let uuid = match &self.uuid {
                Some(u) => u,
                None => return Err(CKR_GENERAL_ERROR)?,
            };
            let blob = match db.read_object_blob(uuid) {
                Ok(b) => b,
                Err(e) => {
                    error!("Failed to read object {}: {}", uuid, e);
                    return Err(CKR_GENERAL_ERROR)?;
                }
            };
            match Attributes::from_bytes(&blob) {
                Ok(a) => {
                    a.trace("[load] ");
                    self.attributes = Some(a);
                }
                Err(e) => {
                    error!("Corrupted object {}: {}", uuid, e);
                    return Err(CKR_GENERAL_ERROR)?;
                }
            }
        }
        match &self.attributes {
            Some(a) => Ok(a),
            None => Err(CKR_GENERAL_ERROR)?,
        }
    }

    /// The crypto backend key of the object, built on first use
    pub fn backend_key(&mut self) -> Result<BackendKey> {
        if let Some(key) = &self.key {
            return Ok(key.clone());
        }
        let key = match &self.attributes {
            Some(a) => BackendKey::from_attributes(a)?,
            None => return Err(CKR_GENERAL_ERROR)?,
        };
        self.key = Some(key.clone());
        Ok(key)
    }
}

impl Token {
    /// Removes a persistent object from the token and from storage.
    ///
    /// Panics if the manifest cannot be updated twice in a row, since
    /// the manifest and the object blobs would diverge.
    pub fn destroy_persistent(&mut self, id: ObjectId) {
        let object = match self.remove_object(id) {
            Some(o) => o,
            None => return,
        };
        let uuid = match object.uuid() {
            Some(u) => u,
            None => return,
        };
        if let Err(e) = self.db.unregister_object(uuid) {
            if !e.is_not_found() {
                warn!("Retrying unregistration of {}: {}", uuid, e);
                if let Err(e) = self.db.unregister_object(uuid) {
                    if !e.is_not_found() {
                        panic!("Cannot unregister object {}: {}", uuid, e);
                    }
                }
            }
        }
        if let Err(e) = self.db.remove_object_blob(uuid) {
            error!("Failed to remove object {}: {}", uuid, e);
        }
        debug!("Token {}: destroyed object {}", self.id(), uuid);
    }

    pub fn destroy_all_objects(&mut self) {
        for id in self.object_ids() {
            self.destroy_persistent(id);
        }
    }
}

/// Resolves an object handle of a session
pub(crate) fn session_object<'a>(
    token: &'a mut Token,
    session: &'a mut Session,
    handle: CK_OBJECT_HANDLE,
) -> Result<(ObjRef, &'a mut Object)> {
    let oref = match session.handles.get(handle) {
        Some(r) => *r,
        None => return Err(CKR_OBJECT_HANDLE_INVALID)?,
    };
    let object = match oref {
        ObjRef::Session(id) => match session.object_mut(id) {
            Some(o) => o,
            None => return Err(CKR_OBJECT_HANDLE_INVALID)?,
        },
        ObjRef::Token(id) => token.load_object(id)?,
    };
    Ok((oref, object))
}

/// Resolves an object handle, checking the login state grants access
/// to the object
pub(crate) fn accessible_object<'a>(
    token: &'a mut Token,
    session: &'a mut Session,
    handle: CK_OBJECT_HANDLE,
) -> Result<(ObjRef, &'a mut Object)> {
    let login = token.login;
    let (oref, object) = session_object(token, session, handle)?;
    match object.attributes() {
        Some(a) if check_access_attrs_against_token(login, a).is_ok() => {
            Ok((oref, object))
        }
        _ => Err(CKR_OBJECT_HANDLE_INVALID)?,
    }
}

/// Publishes a new object and returns its handle in the session.
///
/// Token objects are written to storage and registered in the token
/// manifest first. Whatever was acquired is released on failure.
pub(crate) fn create_object(
    token: &mut Token,
    session: &mut Session,
    attrs: Attributes,
) -> Result<CK_OBJECT_HANDLE> {
    let oref = if attrs.get_bool(CKA_TOKEN) {
        let uuid = Uuid::new_v4();
        token.db.create_object_blob(&uuid, &attrs.to_bytes())?;
        if let Err(e) = token.db.register_object(&uuid) {
            if let Err(e) = token.db.remove_object_blob(&uuid) {
                error!("Failed to remove object {}: {}", uuid, e);
            }
            return Err(e);
        }
        let mut object = Object::persistent(uuid);
        object.attributes = Some(attrs);
        ObjRef::Token(token.insert_object(object))
    } else {
        ObjRef::Session(session.insert_object(Object::new(attrs)))
    };

    match session.handles.mint(oref) {
        Ok(handle) => {
            debug!("Created object {:?} with handle {}", oref, handle);
            Ok(handle)
        }
        Err(e) => {
            match oref {
                ObjRef::Token(id) => token.destroy_persistent(id),
                ObjRef::Session(id) => {
                    session.remove_object(id);
                }
            }
            Err(e)
        }
    }
}

/// Drops an object just published by [`create_object`]
pub(crate) fn release_object(
    token: &mut Token,
    session: &mut Session,
    handle: CK_OBJECT_HANDLE,
) {
    match session.handles.remove(handle) {
        Some(ObjRef::Token(id)) => token.destroy_persistent(id),
        Some(ObjRef::Session(id)) => {
            session.remove_object(id);
        }
        None => (),
    }
}

/// Destroys an object designated by a session handle
fn destroy_object(
    ta: &mut Ta,
    client: ClientId,
    session_handle: CK_SESSION_HANDLE,
    handle: CK_OBJECT_HANDLE,
) -> Result<()> {
    let (token, session) = ta.session_mut(client, session_handle)?;
    let rw = session.is_rw();
    let (oref, object) = accessible_object(token, session, handle)?;
    let destroyable = object
        .attributes()
        .map_or(false, |a| a.get_bool(CKA_DESTROYABLE));
    if let ObjRef::Token(_) = oref {
        if !rw {
            return Err(CKR_SESSION_READ_ONLY)?;
        }
    }
    if !destroyable {
        return Err(CKR_ACTION_PROHIBITED)?;
    }

    match oref {
        ObjRef::Session(id) => {
            session.remove_object(id);
        }
        ObjRef::Token(id) => {
            let slot = token.id();
            token.destroy_persistent(id);
            for s in ta.token_sessions_mut(slot) {
                s.handles.remove_value(&oref);
            }
        }
    }
    Ok(())
}

fn class_is_searchable(class: CK_OBJECT_CLASS) -> bool {
    matches!(
        class,
        CKO_UNDEFINED_ID
            | CKO_DATA
            | CKO_SECRET_KEY
            | CKO_PUBLIC_KEY
            | CKO_PRIVATE_KEY
    )
}

fn template_matches(attrs: &Attributes, template: &Attributes) -> bool {
    /* an empty reference never matches in Attributes::matches, but an
     * empty search template selects every visible object */
    template.is_empty() || attrs.matches(template)
}

/// Snapshots the handles of the objects matching a template
fn find_init(
    token: &mut Token,
    session: &mut Session,
    template: &Attributes,
) -> Result<()> {
    if session.processing.is_some() {
        return Err(CKR_OPERATION_ACTIVE)?;
    }
    if session.find.is_some() {
        error!("A search is already active");
        return Err(CKR_FUNCTION_FAILED)?;
    }
    let template = sanitize_template(template)?;
    if !class_is_searchable(template.get_class()) {
        debug!("Cannot search {}", class_name(template.get_class()));
        return Err(CKR_ARGUMENTS_BAD)?;
    }
    template.trace("[find] ");

    let login = token.login;
    let mut handles = Vec::new();
    for (id, object) in session.objects() {
        let attrs = match object.attributes() {
            Some(a) => a,
            None => continue,
        };
        if check_access_attrs_against_token(login, attrs).is_err() {
            continue;
        }
        if !template_matches(attrs, &template) {
            continue;
        }
        if let Some(h) = session.handles.get_by_value(&ObjRef::Session(*id)) {
            handles.push((h, None));
        }
    }

    let temp_start = handles.len();
    for id in token.object_ids() {
        let attrs = match token.load_object(id) {
            Ok(o) => match o.attributes() {
                Some(a) => a,
                None => continue,
            },
            Err(e) => {
                error!("Skipping unreadable object: {}", e);
                continue;
            }
        };
        if !template_matches(attrs, &template) {
            continue;
        }
        if check_access_attrs_against_token(login, attrs).is_err() {
            continue;
        }
        let oref = ObjRef::Token(id);
        match session.handles.get_by_value(&oref) {
            Some(h) => handles.push((h, None)),
            None => {
                let h = session.handles.mint(oref)?;
                handles.push((h, Some(oref)));
            }
        }
    }

    debug!("Search found {} object(s)", handles.len());
    session.find = Some(FindContext {
        handles: handles,
        next: 0,
        temp_start: temp_start,
        template: template,
    });
    Ok(())
}

/// Releases the search context and the handles it minted that the
/// client never received
fn find_final(session: &mut Session) -> Result<()> {
    let find = match session.find.take() {
        Some(f) => f,
        None => return Err(CKR_OPERATION_NOT_INITIALIZED)?,
    };
    for (handle, oref) in find.unreturned() {
        if session.handles.get(handle) == Some(&oref) {
            session.handles.remove(handle);
        }
    }
    Ok(())
}

/// Fills a client template with the values of an object.
///
/// The output has the layout of the template: each record keeps its
/// data region and only its size field is rewritten.
fn get_attribute_value(
    attrs: &Attributes,
    template: &Attributes,
) -> (Vec<u8>, CK_RV) {
    let mut sensitive = false;
    let mut type_invalid = false;
    let mut too_small = false;

    let mut s = Serializer::new();
    s.put_u32(template.attrs_size() as u32)
        .put_u32(template.count() as u32);
    for (id, region) in template.iter() {
        let mut data = region.to_vec();
        let size = if !attribute_is_exportable(id, attrs) {
            sensitive = true;
            CK_UNAVAILABLE_INFORMATION
        } else {
            match attrs.get_ptr(id) {
                Err(_) => {
                    type_invalid = true;
                    CK_UNAVAILABLE_INFORMATION
                }
                Ok(value) if region.is_empty() => value.len() as u32,
                Ok(value) if value.len() <= region.len() => {
                    data[..value.len()].copy_from_slice(value);
                    value.len() as u32
                }
                Ok(_) => {
                    too_small = true;
                    CK_UNAVAILABLE_INFORMATION
                }
            }
        };
        s.put_u32(id).put_u32(size).put(&data);
    }

    let rv = if sensitive {
        CKR_ATTRIBUTE_SENSITIVE
    } else if type_invalid {
        CKR_ATTRIBUTE_TYPE_INVALID
    } else if too_small {
        CKR_BUFFER_TOO_SMALL
    } else {
        CKR_OK
    };
    (s.finish(), rv)
}

impl Ta {
    pub(crate) fn entry_import_object(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let template = args.alloc_get_attributes()?;
        args.check_consumed()?;
        if out.capacity() != 4 {
            return Err(CKR_ARGUMENTS_BAD)?;
        }

        let (token, session) = self.session_mut(client, handle)?;
        let attrs = create_attributes_from_template(
            &template,
            ProcessingFunc::Import,
            None,
        )?;
        check_created_attrs_against_processing(SKS_PROCESSING_IMPORT, &attrs)?;
        if attrs.get_class() == CKO_SECRET_KEY && !attrs.has(CKA_VALUE) {
            error!("Imported secret key has no value");
            return Err(CKR_TEMPLATE_INCOMPLETE)?;
        }
        if class_is_key(attrs.get_class()) {
            check_created_attrs(&attrs, None)?;
        }
        check_created_attrs_against_token(token.login, session.is_rw(), &attrs)?;

        let obj = create_object(token, session, attrs)?;
        out.write_exact(&obj.to_le_bytes())
    }

    pub(crate) fn entry_destroy_object(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let session = args.get_u32()?;
        let handle = args.get_u32()?;
        args.check_consumed()?;
        destroy_object(self, client, session, handle)
    }

    pub(crate) fn entry_find_init(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        let template = args.alloc_get_attributes()?;
        args.check_consumed()?;

        let (token, session) = self.session_mut(client, handle)?;
        find_init(token, session, &template)
    }

    pub(crate) fn entry_find(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        args.check_consumed()?;

        let (_, session) = self.session_mut(client, handle)?;
        let find = match &mut session.find {
            Some(f) => f,
            None => return Err(CKR_OPERATION_NOT_INITIALIZED)?,
        };
        let mut s = Serializer::new();
        for h in find.results(out.capacity() / 4) {
            s.put_u32(h);
        }
        out.write(&s.finish())
    }

    pub(crate) fn entry_find_final(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let handle = args.get_u32()?;
        args.check_consumed()?;

        let (_, session) = self.session_mut(client, handle)?;
        find_final(session)
    }

    pub(crate) fn entry_get_object_size(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let session = args.get_u32()?;
        let handle = args.get_u32()?;
        args.check_consumed()?;
        if out.capacity() != 4 {
            return Err(CKR_ARGUMENTS_BAD)?;
        }

        let (token, session) = self.session_mut(client, session)?;
        let (_, object) = accessible_object(token, session, handle)?;
        let size = match object.attributes() {
            Some(a) => u32::try_from(a.size())?,
            None => return Err(CKR_GENERAL_ERROR)?,
        };
        out.write_exact(&size.to_le_bytes())
    }

    pub(crate) fn entry_get_attribute_value(
        &mut self,
        client: ClientId,
        ctrl: &[u8],
        out: &mut Output,
    ) -> Result<()> {
        let mut args = SerialArgs::new(ctrl);
        let session = args.get_u32()?;
        let handle = args.get_u32()?;
        let template = args.alloc_get_attributes()?;
        args.check_consumed()?;

        let (token, session) = self.session_mut(client, session)?;
        let (_, object) = accessible_object(token, session, handle)?;
        let attrs = match object.attributes() {
            Some(a) => a,
            None => return Err(CKR_GENERAL_ERROR)?,
        };
        let (data, rv) = get_attribute_value(attrs, &template);
        out.write(&data)?;
        if rv != CKR_OK {
            return Err(rv)?;
        }
        Ok(())
    }
}
