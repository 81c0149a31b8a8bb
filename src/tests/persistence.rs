// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use crate::tests::*;

use serial_test::parallel;

fn ecb_encrypt(testtokn: &mut TestToken, key: u32, data: &[u8]) -> Vec<u8> {
    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_ECB, &[]);
    assert_eq!(rv, CKR_OK);
    testtokn.step_ok(SKS_CMD_ENCRYPT_ONESHOT, data)
}

#[test]
#[parallel]
fn test_token_object_survives_reload() {
    let mut testtokn = TestToken::initialized();
    let mut template = aes_template(16);
    template.add_bool(CKA_TOKEN, true);
    template.add(CKA_LABEL, b"persistent key");
    let key = ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &template));
    let size = ret_or_panic!(testtokn.object_size(key));
    let enc = ecb_encrypt(&mut testtokn, key, &[0x5au8; 16]);

    let blobs = testtokn.object_blobs();
    assert_eq!(blobs.len(), 1);
    assert_eq!(blobs[0].1.len(), size as usize);
    assert_eq!(testtokn.close_session(), CKR_OK);

    let mut reloaded = testtokn.reload();
    reloaded.session = ret_or_panic!(reloaded.open_session(true));
    assert_eq!(reloaded.login(CKU_USER, USER_PIN), CKR_OK);

    let found =
        reloaded.find_all(&make_template!((u32, CKA_CLASS, CKO_SECRET_KEY)));
    assert_eq!(found.len(), 1);
    let key = found[0];
    assert_eq!(reloaded.object_size(key), Ok(size));
    assert_eq!(
        reloaded.get_attr(key, CKA_LABEL),
        Ok(b"persistent key".to_vec())
    );
    assert_eq!(ecb_encrypt(&mut reloaded, key, &[0x5au8; 16]), enc);

    /* loading the object did not rewrite it */
    assert_eq!(reloaded.object_blobs(), blobs);

    /* destroying it after a reload removes the blob too */
    assert_eq!(reloaded.destroy(key), CKR_OK);
    assert!(reloaded.object_blobs().is_empty());
    let mut again = reloaded.reload();
    again.session = ret_or_panic!(again.open_session(true));
    assert_eq!(again.login(CKU_USER, USER_PIN), CKR_OK);
    assert!(again.find_all(&Attributes::new()).is_empty());
}

#[test]
#[parallel]
fn test_session_objects_do_not_persist() {
    let mut testtokn = TestToken::initialized();
    ret_or_panic!(testtokn.import(&data_template(b"session", b"gone")));
    ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &aes_template(32)));
    assert!(testtokn.object_blobs().is_empty());

    let mut reloaded = testtokn.reload();
    reloaded.session = ret_or_panic!(reloaded.open_session(true));
    assert_eq!(reloaded.login(CKU_USER, USER_PIN), CKR_OK);
    assert!(reloaded.find_all(&Attributes::new()).is_empty());
}

#[test]
#[parallel]
fn test_token_state_survives_reload() {
    let mut testtokn = TestToken::initialized();
    assert_eq!(testtokn.logout(), CKR_OK);
    assert_eq!(testtokn.login(CKU_USER, b"00000000"), CKR_PIN_INCORRECT);
    assert_eq!(testtokn.close_session(), CKR_OK);

    let mut reloaded = testtokn.reload();
    let info = reloaded.token_info();
    assert_eq!(&info[..TOKEN_LABEL.len()], TOKEN_LABEL);
    let flags = le_u32(&info, TOKEN_FLAGS_OFFSET);
    assert_ne!(flags & CKF_TOKEN_INITIALIZED, 0);
    assert_ne!(flags & CKF_USER_PIN_INITIALIZED, 0);
    assert_ne!(flags & CKF_USER_PIN_COUNT_LOW, 0);

    /* the PINs were stored, not only their state */
    reloaded.session = ret_or_panic!(reloaded.open_session(true));
    assert_eq!(reloaded.login(CKU_SO, USER_PIN), CKR_PIN_INCORRECT);
    assert_eq!(reloaded.login(CKU_USER, USER_PIN), CKR_OK);
    assert_eq!(reloaded.token_flags() & CKF_USER_PIN_COUNT_LOW, 0);

    /* the other token was never initialized */
    reloaded.slot = 1;
    assert_eq!(reloaded.token_flags() & CKF_TOKEN_INITIALIZED, 0);
}

#[test]
#[parallel]
fn test_private_token_objects() {
    let mut testtokn = TestToken::initialized();
    let mut template = data_template(b"secret data", b"value");
    template.add_bool(CKA_TOKEN, true);
    template.add_bool(CKA_PRIVATE, true);
    ret_or_panic!(testtokn.import(&template));

    /* the object is not readable before a login */
    let mut reloaded = testtokn.reload();
    reloaded.session = ret_or_panic!(reloaded.open_session(true));
    assert!(reloaded.find_all(&Attributes::new()).is_empty());
    assert_eq!(reloaded.login(CKU_USER, USER_PIN), CKR_OK);
    let found = reloaded.find_all(&Attributes::new());
    assert_eq!(found.len(), 1);
    assert_eq!(reloaded.get_attr(found[0], CKA_VALUE), Ok(b"value".to_vec()));
}
