// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use crate::tests::*;

use serial_test::parallel;

#[test]
#[parallel]
fn test_import_and_read_back() {
    let mut testtokn = TestToken::initialized();
    let mut template = data_template(b"my data", b"some value");
    template.add(CKA_APPLICATION, b"sks tests");
    let obj = ret_or_panic!(testtokn.import(&template));

    for (id, value) in template.iter() {
        assert_eq!(ret_or_panic!(testtokn.get_attr(obj, id)), value);
    }
    assert_eq!(testtokn.get_attr_u32(obj, CKA_CLASS), Ok(CKO_DATA));

    /* defaults are filled in */
    assert_eq!(testtokn.get_attr(obj, CKA_TOKEN), Ok(vec![CK_FALSE]));
    assert_eq!(testtokn.get_attr(obj, CKA_DESTROYABLE), Ok(vec![CK_TRUE]));
    assert!(ret_or_panic!(testtokn.object_size(obj)) > 0);
}

#[test]
#[parallel]
fn test_sensitive_redaction() {
    let mut testtokn = TestToken::initialized();
    let template = make_template!(
        (u32, CKA_CLASS, CKO_SECRET_KEY),
        (u32, CKA_KEY_TYPE, CKK_AES),
        (bytes, CKA_VALUE, &[0x42u8; 16]),
        (bool, CKA_SENSITIVE, true),
        (bool, CKA_EXTRACTABLE, false),
    );
    let key = ret_or_panic!(testtokn.import(&template));

    let query = make_template!((bytes, CKA_VALUE, &[0u8; 16]));
    let reply = testtokn.get_attribute_value(key, &query, query.size());
    assert_eq!(reply.rv, CKR_ATTRIBUTE_SENSITIVE);
    assert_eq!(le_u32(&reply.out, 8), CKA_VALUE);
    assert_eq!(le_u32(&reply.out, 12), CK_UNAVAILABLE_INFORMATION);
    assert_eq!(&reply.out[16..], &[0u8; 16]);

    /* the length of the value is not secret */
    assert_eq!(testtokn.get_attr_u32(key, CKA_VALUE_LEN), Ok(16));
}

#[test]
#[parallel]
fn test_attribute_errors() {
    let mut testtokn = TestToken::initialized();
    let obj = ret_or_panic!(testtokn.import(&data_template(b"label", b"")));

    /* the output must hold the whole template */
    let query = make_template!((bytes, CKA_LABEL, &[0u8; 5]));
    let reply = testtokn.get_attribute_value(obj, &query, 4);
    assert_eq!(reply.rv, CKR_BUFFER_TOO_SMALL);
    assert_eq!(reply.tee, TeeResult::ShortBuffer);
    assert_eq!(reply.size, query.size());

    /* an attribute region too small is reported in its entry */
    let query = make_template!(
        (bytes, CKA_LABEL, &[0u8; 2]),
        (bytes, CKA_VALUE, &[]),
    );
    let reply = testtokn.get_attribute_value(obj, &query, query.size());
    assert_eq!(reply.rv, CKR_BUFFER_TOO_SMALL);
    assert_eq!(le_u32(&reply.out, 12), CK_UNAVAILABLE_INFORMATION);
    assert_eq!(le_u32(&reply.out, 22), 0);

    let query = make_template!((bytes, CKA_MODULUS, &[]));
    let reply = testtokn.get_attribute_value(obj, &query, query.size());
    assert_eq!(reply.rv, CKR_ATTRIBUTE_TYPE_INVALID);
    assert_eq!(le_u32(&reply.out, 12), CK_UNAVAILABLE_INFORMATION);

    let reply = testtokn.get_attribute_value(obj + 100, &query, query.size());
    assert_eq!(reply.rv, CKR_OBJECT_HANDLE_INVALID);
}

#[test]
#[parallel]
fn test_invalid_templates() {
    let mut testtokn = TestToken::initialized();

    let template = make_template!((bytes, CKA_LABEL, b"no class"));
    assert_eq!(testtokn.import(&template), Err(CKR_TEMPLATE_INCONSISTENT));

    let template = make_template!(
        (u32, CKA_CLASS, CKO_DATA),
        (bytes, 0x7fff_0000, b"unknown"),
    );
    assert_eq!(testtokn.import(&template), Err(CKR_ATTRIBUTE_TYPE_INVALID));

    let template = make_template!(
        (u32, CKA_CLASS, CKO_DATA),
        (bytes, CKA_TOKEN, &[2u8]),
    );
    assert_eq!(testtokn.import(&template), Err(CKR_ATTRIBUTE_VALUE_INVALID));

    /* secret keys need a value of a valid size */
    let template = make_template!(
        (u32, CKA_CLASS, CKO_SECRET_KEY),
        (u32, CKA_KEY_TYPE, CKK_AES),
    );
    assert_eq!(testtokn.import(&template), Err(CKR_TEMPLATE_INCOMPLETE));
    let template = make_template!(
        (u32, CKA_CLASS, CKO_SECRET_KEY),
        (u32, CKA_KEY_TYPE, CKK_AES),
        (bytes, CKA_VALUE, &[1u8; 15]),
    );
    assert_eq!(testtokn.import(&template), Err(CKR_KEY_SIZE_RANGE));
}

#[test]
#[parallel]
fn test_creation_rights() {
    let mut testtokn = TestToken::initialized();
    let rw = testtokn.session;
    testtokn.session = ret_or_panic!(testtokn.open_session(false));

    let mut template = data_template(b"token object", b"");
    template.add_bool(CKA_TOKEN, true);
    assert_eq!(testtokn.import(&template), Err(CKR_SESSION_READ_ONLY));
    assert!(testtokn.import(&data_template(b"session", b"")).is_ok());

    testtokn.session = rw;
    assert_eq!(testtokn.logout(), CKR_OK);
    let mut template = data_template(b"private", b"");
    template.add_bool(CKA_PRIVATE, true);
    assert_eq!(testtokn.import(&template), Err(CKR_USER_NOT_LOGGED_IN));

    /* trusted objects are reserved to the SO */
    assert_eq!(testtokn.login(CKU_USER, USER_PIN), CKR_OK);
    let mut template = aes_template(16);
    template.add_bool(CKA_TRUSTED, true);
    assert_eq!(
        testtokn.generate_key(CKM_AES_KEY_GEN, &template),
        Err(CKR_KEY_FUNCTION_NOT_PERMITTED)
    );
}

#[test]
#[parallel]
fn test_destroy() {
    let mut testtokn = TestToken::initialized();
    let obj = ret_or_panic!(testtokn.import(&data_template(b"gone", b"")));
    assert_eq!(testtokn.destroy(obj), CKR_OK);
    assert_eq!(testtokn.destroy(obj), CKR_OBJECT_HANDLE_INVALID);
    assert_eq!(testtokn.object_size(obj), Err(CKR_OBJECT_HANDLE_INVALID));

    let mut template = data_template(b"kept", b"");
    template.add_bool(CKA_DESTROYABLE, false);
    let obj = ret_or_panic!(testtokn.import(&template));
    assert_eq!(testtokn.destroy(obj), CKR_ACTION_PROHIBITED);
    assert!(testtokn.object_size(obj).is_ok());

    /* token objects need a RW session */
    let mut template = data_template(b"token", b"");
    template.add_bool(CKA_TOKEN, true);
    let obj = ret_or_panic!(testtokn.import(&template));
    assert_eq!(testtokn.object_blobs().len(), 1);
    let rw = testtokn.session;
    testtokn.session = ret_or_panic!(testtokn.open_session(false));
    let found = testtokn.find_all(&make_template!((bool, CKA_TOKEN, true)));
    assert_eq!(found.len(), 1);
    assert_eq!(testtokn.destroy(found[0]), CKR_SESSION_READ_ONLY);

    testtokn.session = rw;
    assert_eq!(testtokn.destroy(obj), CKR_OK);
    assert!(testtokn.object_blobs().is_empty());
}

#[test]
#[parallel]
fn test_import_output_size() {
    let mut testtokn = TestToken::initialized();
    let template = data_template(b"label", b"");
    let ctrl = ctrl(&[testtokn.session], &template.to_bytes());
    let reply = testtokn.call(
        SKS_CMD_IMPORT_OBJECT,
        &ctrl,
        Param::none(),
        Param::output(2),
    );
    assert_eq!(reply.rv, CKR_ARGUMENTS_BAD);
}
