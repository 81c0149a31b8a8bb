// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use crate::tests::*;

use serial_test::{parallel, serial};

#[test]
#[parallel]
fn test_parameter_checks() {
    let mut testtokn = TestToken::initialized();
    let ctrl = ctrl(&[testtokn.session], &[]);

    let mut params =
        [Param::inout(&ctrl), Param::none(), Param::none(), Param::none()];
    let tee = testtokn.ta.invoke(testtokn.client, 0x7fff_0000, &mut params);
    assert_eq!(tee, TeeResult::NotSupported);

    /* control arguments go both ways */
    let mut params =
        [Param::input(&ctrl), Param::none(), Param::none(), Param::none()];
    let tee = testtokn.ta.invoke(testtokn.client, SKS_CMD_LOGOUT, &mut params);
    assert_eq!(tee, TeeResult::BadParameters);

    let mut params = [
        Param::inout(&ctrl),
        Param::none(),
        Param::none(),
        Param::output(4),
    ];
    let tee = testtokn.ta.invoke(testtokn.client, SKS_CMD_LOGOUT, &mut params);
    assert_eq!(tee, TeeResult::BadParameters);

    let mut params = [
        Param::inout(&ctrl),
        Param::output(4),
        Param::none(),
        Param::none(),
    ];
    let tee = testtokn.ta.invoke(testtokn.client, SKS_CMD_LOGOUT, &mut params);
    assert_eq!(tee, TeeResult::BadParameters);

    /* none of the rejected calls reached the token */
    assert_eq!(testtokn.session_state(), CKS_RW_USER_FUNCTIONS);
}

#[test]
#[parallel]
fn test_control_arguments() {
    let mut testtokn = TestToken::initialized();

    /* trailing bytes are an error */
    let rv = testtokn.call_rv(
        SKS_CMD_LOGOUT,
        &ctrl(&[testtokn.session, 0], &[]),
    );
    assert_eq!(rv, CKR_ARGUMENTS_BAD);

    /* so are missing ones */
    let rv = testtokn.call_rv(SKS_CMD_LOGOUT, &[1, 0]);
    assert_eq!(rv, CKR_ARGUMENTS_BAD);

    let rv = testtokn.call_rv(SKS_CMD_LOGOUT, &ctrl(&[0xdead], &[]));
    assert_eq!(rv, CKR_SESSION_HANDLE_INVALID);
    assert_eq!(testtokn.session_state(), CKS_RW_USER_FUNCTIONS);
}

#[test]
#[parallel]
fn test_not_implemented() {
    let mut testtokn = TestToken::initialized();
    let obj = ret_or_panic!(testtokn.import(&data_template(b"data", b"")));
    let ctrl = ctrl(&[testtokn.session, obj], &Attributes::new().to_bytes());
    for cmd in [SKS_CMD_COPY_OBJECT, SKS_CMD_SET_ATTRIBUTE_VALUE] {
        let reply = testtokn.call(cmd, &ctrl, Param::none(), Param::output(4));
        assert_eq!(reply.rv, SKS_RV_NOT_IMPLEMENTED);
        assert_eq!(reply.tee, TeeResult::Success);
    }
}

#[test]
#[parallel]
fn test_client_lifetime() {
    let mut testtokn = TestToken::initialized();

    /* a second client with its own sessions */
    let other = testtokn.ta.register_client();
    let client = testtokn.client;
    testtokn.client = other;
    ret_or_panic!(testtokn.open_session(true));
    ret_or_panic!(testtokn.open_session(false));
    testtokn.client = client;
    assert_eq!(le_u32(&testtokn.token_info(), TOKEN_SESSIONS_OFFSET), 3);

    /* a departing client loses its sessions */
    testtokn.ta.unregister_client(other);
    let info = testtokn.token_info();
    assert_eq!(le_u32(&info, TOKEN_SESSIONS_OFFSET), 1);
    assert_eq!(le_u32(&info, TOKEN_RW_SESSIONS_OFFSET), 1);
    assert_eq!(testtokn.session_state(), CKS_RW_USER_FUNCTIONS);

    testtokn.client = other;
    let reply = testtokn.call(SKS_CMD_PING, &[], Param::none(), Param::none());
    assert_eq!(reply.tee, TeeResult::BadState);

    /* the last client leaving logs the token out */
    testtokn.ta.unregister_client(client);
    testtokn.client = testtokn.ta.register_client();
    testtokn.session = ret_or_panic!(testtokn.open_session(true));
    assert_eq!(testtokn.session_state(), CKS_RW_PUBLIC_SESSION);
}

#[test]
#[serial]
fn test_library_entry_points() {
    let storage: Arc<dyn SecureStorage> = Arc::new(MemoryStorage::new());
    assert_eq!(crate::init_with(Config::default(), storage), CKR_OK);

    let client = ret_or_panic!(crate::open_client());
    let mut params = [
        Param::inout(&[]),
        Param::none(),
        Param::output(12),
        Param::none(),
    ];
    assert_eq!(
        crate::invoke(client, SKS_CMD_PING, &mut params),
        TeeResult::Success
    );
    assert_eq!(le_u32(&params[0].memref.buffer, 0), CKR_OK);
    assert_eq!(params[2].memref.data(), &ctrl(&[0, 1, 0], &[])[..]);

    let mut params = [
        Param::inout(&ctrl(&[0], &[])),
        Param::none(),
        Param::output(4),
        Param::none(),
    ];
    assert_eq!(
        crate::invoke(client, SKS_CMD_OPEN_RW_SESSION, &mut params),
        TeeResult::Success
    );
    assert_eq!(le_u32(&params[0].memref.buffer, 0), CKR_OK);

    crate::close_client(client);
    let mut params =
        [Param::inout(&[]), Param::none(), Param::none(), Param::none()];
    assert_eq!(
        crate::invoke(client, SKS_CMD_PING, &mut params),
        TeeResult::BadState
    );

    let client = ret_or_panic!(crate::open_client());
    crate::deinit();
    assert_eq!(
        crate::invoke(client, SKS_CMD_PING, &mut params),
        TeeResult::BadState
    );
    assert!(crate::open_client().is_err());
}
