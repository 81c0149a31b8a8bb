// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use crate::tests::*;

use serial_test::parallel;

#[test]
#[parallel]
fn test_ping() {
    let mut testtokn = TestToken::new();
    let reply = testtokn.call(SKS_CMD_PING, &[], Param::none(), Param::output(12));
    assert_eq!(reply.rv, CKR_OK);
    assert_eq!(reply.out, ctrl(&[0, 1, 0], &[]));

    /* the version is optional */
    let reply = testtokn.call(SKS_CMD_PING, &[], Param::none(), Param::none());
    assert_eq!(reply.rv, CKR_OK);
}

#[test]
#[parallel]
fn test_slot_list() {
    let mut testtokn = TestToken::new();
    let reply = testtokn.call(
        SKS_CMD_SLOT_LIST,
        &[],
        Param::none(),
        Param::output(16),
    );
    assert_eq!(reply.rv, CKR_OK);
    assert_eq!(reply.out, ctrl(&[0, 1], &[]));

    /* the required size is reported back */
    let reply =
        testtokn.call(SKS_CMD_SLOT_LIST, &[], Param::none(), Param::output(4));
    assert_eq!(reply.rv, CKR_BUFFER_TOO_SMALL);
    assert_eq!(reply.tee, TeeResult::ShortBuffer);
    assert_eq!(reply.size, 8);

    let reply = testtokn.call(
        SKS_CMD_SLOT_INFO,
        &ctrl(&[7], &[]),
        Param::none(),
        Param::output(128),
    );
    assert_eq!(reply.rv, CKR_SLOT_ID_INVALID);
}

#[test]
#[parallel]
fn test_init_token() {
    let mut testtokn = TestToken::new();
    assert_eq!(testtokn.token_flags() & CKF_TOKEN_INITIALIZED, 0);

    assert_eq!(testtokn.init_token(b"123", TOKEN_LABEL), CKR_PIN_LEN_RANGE);
    assert_eq!(testtokn.init_token(SO_PIN, TOKEN_LABEL), CKR_OK);

    let info = testtokn.token_info();
    assert_eq!(&info[..TOKEN_LABEL.len()], TOKEN_LABEL);
    assert_eq!(info[TOKEN_LABEL.len()], b' ');
    let flags = le_u32(&info, TOKEN_FLAGS_OFFSET);
    assert_ne!(flags & CKF_TOKEN_INITIALIZED, 0);
    assert_eq!(flags & CKF_USER_PIN_INITIALIZED, 0);

    /* the other token is untouched */
    testtokn.slot = 1;
    assert_eq!(testtokn.token_flags() & CKF_TOKEN_INITIALIZED, 0);
}

#[test]
#[parallel]
fn test_reinit_token() {
    let mut testtokn = TestToken::initialized();
    let mut template = aes_template(16);
    template.add_bool(CKA_TOKEN, true);
    ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &template));

    /* sessions prevent initialization */
    assert_eq!(
        testtokn.init_token(SO_PIN, b"RENAMED"),
        CKR_SESSION_EXISTS
    );
    assert_eq!(testtokn.close_session(), CKR_OK);

    assert_eq!(
        testtokn.init_token(b"wrong pin", b"RENAMED"),
        CKR_PIN_INCORRECT
    );
    assert_eq!(testtokn.init_token(SO_PIN, b"RENAMED"), CKR_OK);

    let info = testtokn.token_info();
    assert_eq!(&info[..7], b"RENAMED");
    let flags = le_u32(&info, TOKEN_FLAGS_OFFSET);
    assert_eq!(flags & CKF_USER_PIN_INITIALIZED, 0);
    assert_eq!(flags & CKF_SO_PIN_COUNT_LOW, 0);

    /* token objects are gone along with the user PIN */
    testtokn.session = ret_or_panic!(testtokn.open_session(true));
    assert!(testtokn.find_all(&Attributes::new()).is_empty());
    assert!(testtokn.object_blobs().is_empty());
    assert_eq!(
        testtokn.login(CKU_USER, USER_PIN),
        CKR_USER_PIN_NOT_INITIALIZED
    );
}

#[test]
#[parallel]
fn test_init_token_blocked_by_any_session() {
    let mut testtokn = TestToken::new();
    assert_eq!(testtokn.init_token(SO_PIN, TOKEN_LABEL), CKR_OK);
    testtokn.slot = 1;
    assert_eq!(testtokn.init_token(SO_PIN, TOKEN_LABEL), CKR_OK);

    /* a session on the other token */
    testtokn.session = ret_or_panic!(testtokn.open_session(false));
    testtokn.slot = 0;
    assert_eq!(
        testtokn.init_token(SO_PIN, b"RENAMED"),
        CKR_SESSION_EXISTS
    );
    assert_eq!(testtokn.close_session(), CKR_OK);

    /* a session held by another client */
    let client = testtokn.client;
    let other = testtokn.ta.register_client();
    testtokn.client = other;
    testtokn.slot = 1;
    ret_or_panic!(testtokn.open_session(false));
    testtokn.client = client;
    testtokn.slot = 0;
    assert_eq!(
        testtokn.init_token(SO_PIN, b"RENAMED"),
        CKR_SESSION_EXISTS
    );

    testtokn.ta.unregister_client(other);
    assert_eq!(testtokn.init_token(SO_PIN, b"RENAMED"), CKR_OK);
    assert_eq!(&testtokn.token_info()[..7], b"RENAMED");
}

#[test]
#[parallel]
fn test_mechanisms() {
    let mut testtokn = TestToken::new();
    let reply = testtokn.call(
        SKS_CMD_MECHANISM_IDS,
        &ctrl(&[0], &[]),
        Param::none(),
        Param::output(1024),
    );
    assert_eq!(reply.rv, CKR_OK);
    let ids: Vec<u32> =
        reply.out.chunks_exact(4).map(|c| le_u32(c, 0)).collect();
    assert!(ids.contains(&CKM_AES_CBC));
    assert!(ids.contains(&CKM_ECDSA_SHA256));
    assert!(!ids.contains(&CKM_RSA_9796));
    assert!(!ids.contains(&CKM_SHA256));

    let reply = testtokn.call(
        SKS_CMD_MECHANISM_INFO,
        &ctrl(&[0, CKM_AES_CBC], &[]),
        Param::none(),
        Param::output(12),
    );
    assert_eq!(reply.rv, CKR_OK);
    assert_eq!(le_u32(&reply.out, 0), 16);
    assert_eq!(le_u32(&reply.out, 4), 32);
    let flags = le_u32(&reply.out, 8);
    assert_ne!(flags & CKF_ENCRYPT, 0);
    assert_ne!(flags & CKF_DECRYPT, 0);
    assert_eq!(flags & CKF_SIGN, 0);

    let reply = testtokn.call(
        SKS_CMD_MECHANISM_INFO,
        &ctrl(&[0, CKM_RSA_9796], &[]),
        Param::none(),
        Param::output(12),
    );
    assert_eq!(reply.rv, CKR_MECHANISM_INVALID);
}

#[test]
#[parallel]
fn test_session_counts() {
    let mut testtokn = TestToken::initialized();
    let ro = ret_or_panic!(testtokn.open_session(false));
    let info = testtokn.token_info();
    assert_eq!(le_u32(&info, TOKEN_SESSIONS_OFFSET), 2);
    assert_eq!(le_u32(&info, TOKEN_RW_SESSIONS_OFFSET), 1);

    assert_eq!(testtokn.session_state(), CKS_RW_USER_FUNCTIONS);
    let rw = testtokn.session;
    testtokn.session = ro;
    assert_eq!(testtokn.session_state(), CKS_RO_USER_FUNCTIONS);

    /* session handles are scoped to the slot they were opened on */
    let rv = testtokn.call_rv(SKS_CMD_CLOSE_ALL_SESSIONS, &ctrl(&[1], &[]));
    assert_eq!(rv, CKR_OK);
    assert_eq!(testtokn.session_state(), CKS_RO_USER_FUNCTIONS);

    let rv = testtokn.call_rv(SKS_CMD_CLOSE_ALL_SESSIONS, &ctrl(&[0], &[]));
    assert_eq!(rv, CKR_OK);
    let info = testtokn.token_info();
    assert_eq!(le_u32(&info, TOKEN_SESSIONS_OFFSET), 0);
    assert_eq!(le_u32(&info, TOKEN_RW_SESSIONS_OFFSET), 0);

    testtokn.session = rw;
    assert_eq!(testtokn.close_session(), CKR_SESSION_HANDLE_INVALID);
}

#[test]
#[parallel]
fn test_open_session_output() {
    let mut testtokn = TestToken::new();
    /* the handle output must be exactly 4 bytes */
    let reply = testtokn.call(
        SKS_CMD_OPEN_RW_SESSION,
        &ctrl(&[0], &[]),
        Param::none(),
        Param::output(8),
    );
    assert_eq!(reply.rv, CKR_ARGUMENTS_BAD);

    let reply = testtokn.call(
        SKS_CMD_OPEN_RW_SESSION,
        &ctrl(&[2], &[]),
        Param::none(),
        Param::output(4),
    );
    assert_eq!(reply.rv, CKR_SLOT_ID_INVALID);
}
