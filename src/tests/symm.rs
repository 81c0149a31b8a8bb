// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

use crate::tests::*;

use serial_test::parallel;

fn import_aes(testtokn: &mut TestToken, value: &[u8], sign: bool) -> u32 {
    let mut template = make_template!(
        (u32, CKA_CLASS, CKO_SECRET_KEY),
        (u32, CKA_KEY_TYPE, CKK_AES),
        (bytes, CKA_VALUE, value),
        (bool, CKA_ENCRYPT, true),
        (bool, CKA_DECRYPT, true),
    );
    if sign {
        template.add_bool(CKA_SIGN, true);
        template.add_bool(CKA_VERIFY, true);
    }
    ret_or_panic!(testtokn.import(&template))
}

#[test]
#[parallel]
fn test_aes_cbc_roundtrip() {
    let mut testtokn = TestToken::initialized();
    let key = ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &aes_template(16)));
    assert_eq!(testtokn.get_attr_u32(key, CKA_VALUE_LEN), Ok(16));
    assert_eq!(testtokn.get_attr(key, CKA_LOCAL), Ok(vec![CK_TRUE]));

    let iv = [0u8; 16];
    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_CBC, &iv);
    assert_eq!(rv, CKR_OK);

    /* probing the output size keeps the processing */
    let reply = testtokn.step(SKS_CMD_ENCRYPT_ONESHOT, &[0u8; 32], 16);
    assert_eq!(reply.rv, CKR_BUFFER_TOO_SMALL);
    assert_eq!(reply.size, 32);
    let enc = testtokn.step_ok(SKS_CMD_ENCRYPT_ONESHOT, &[0u8; 32]);
    assert_eq!(enc.len(), 32);
    assert_ne!(enc, vec![0u8; 32]);

    /* the processing ended with the one-shot */
    let reply = testtokn.step(SKS_CMD_ENCRYPT_ONESHOT, &[0u8; 32], 32);
    assert_eq!(reply.rv, CKR_OPERATION_NOT_INITIALIZED);

    let rv = testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_CBC, &iv);
    assert_eq!(rv, CKR_OK);
    let dec = testtokn.step_ok(SKS_CMD_DECRYPT_ONESHOT, &enc);
    assert_eq!(dec, vec![0u8; 32]);
}

#[test]
#[parallel]
fn test_aes_ecb_known_answer() {
    let mut testtokn = TestToken::initialized();
    let value = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
    let key = import_aes(&mut testtokn, &value, false);

    let plain = hex::decode("00112233445566778899aabbccddeeff").unwrap();
    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_ECB, &[]);
    assert_eq!(rv, CKR_OK);
    let enc = testtokn.step_ok(SKS_CMD_ENCRYPT_ONESHOT, &plain);
    assert_eq!(hex::encode(enc), "69c4e0d86a7b0430d8cdb78070b4c55a");
}

#[test]
#[parallel]
fn test_aes_cbc_pad_multipart() {
    let mut testtokn = TestToken::initialized();
    let key = ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &aes_template(32)));
    let iv = [7u8; 16];
    let data: Vec<u8> = (0..20u8).collect();

    let rv =
        testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_CBC_PAD, &iv);
    assert_eq!(rv, CKR_OK);
    let mut enc = testtokn.step_ok(SKS_CMD_ENCRYPT_UPDATE, &data[..10]);
    assert!(enc.is_empty());
    enc.extend(testtokn.step_ok(SKS_CMD_ENCRYPT_UPDATE, &data[10..]));
    assert_eq!(enc.len(), 16);
    enc.extend(testtokn.step_ok(SKS_CMD_ENCRYPT_FINAL, &[]));
    assert_eq!(enc.len(), 32);

    /* a one-shot cannot follow an update */
    let rv =
        testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_CBC_PAD, &iv);
    assert_eq!(rv, CKR_OK);
    let rv =
        testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_CBC_PAD, &iv);
    assert_eq!(rv, CKR_OPERATION_ACTIVE);
    testtokn.step_ok(SKS_CMD_DECRYPT_UPDATE, &enc[..16]);
    let reply = testtokn.step(SKS_CMD_DECRYPT_ONESHOT, &enc[16..], 64);
    assert_eq!(reply.rv, CKR_OPERATION_ACTIVE);
    let reply = testtokn.step(SKS_CMD_DECRYPT_FINAL, &[], 64);
    assert_eq!(reply.rv, CKR_OPERATION_NOT_INITIALIZED);

    let rv =
        testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_CBC_PAD, &iv);
    assert_eq!(rv, CKR_OK);
    assert_eq!(testtokn.step_ok(SKS_CMD_DECRYPT_ONESHOT, &enc), data);
}

#[test]
#[parallel]
fn test_aes_length_errors() {
    let mut testtokn = TestToken::initialized();
    let key = ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &aes_template(16)));

    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_CBC, &[0u8; 8]);
    assert_eq!(rv, CKR_MECHANISM_PARAM_INVALID);

    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_CBC, &[0u8; 16]);
    assert_eq!(rv, CKR_OK);
    let reply = testtokn.step(SKS_CMD_ENCRYPT_ONESHOT, &[0u8; 15], 64);
    assert_eq!(reply.rv, SKS_CKR_DATA_LEN_RANGE);

    /* the failure terminated the processing */
    let reply = testtokn.step(SKS_CMD_ENCRYPT_ONESHOT, &[0u8; 16], 64);
    assert_eq!(reply.rv, CKR_OPERATION_NOT_INITIALIZED);

    let rv = testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_ECB, &[]);
    assert_eq!(rv, CKR_OK);
    let reply = testtokn.step(SKS_CMD_DECRYPT_ONESHOT, &[0u8; 17], 64);
    assert_eq!(reply.rv, SKS_CKR_ENCRYPTED_DATA_LEN_RANGE);
}

#[test]
#[parallel]
fn test_aes_ctr() {
    let mut testtokn = TestToken::initialized();
    let key = ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &aes_template(24)));
    let params = ctrl(&[32], &[0xf0u8; 16]);
    let data = [0x33u8; 45];

    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_CTR, &params);
    assert_eq!(rv, CKR_OK);
    /* a stream mode returns output as it comes */
    let mut enc = testtokn.step_ok(SKS_CMD_ENCRYPT_UPDATE, &data[..7]);
    assert_eq!(enc.len(), 7);
    enc.extend(testtokn.step_ok(SKS_CMD_ENCRYPT_UPDATE, &data[7..]));
    enc.extend(testtokn.step_ok(SKS_CMD_ENCRYPT_FINAL, &[]));
    assert_eq!(enc.len(), data.len());

    let rv = testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_CTR, &params);
    assert_eq!(rv, CKR_OK);
    assert_eq!(testtokn.step_ok(SKS_CMD_DECRYPT_ONESHOT, &enc), data.to_vec());
}

#[test]
#[parallel]
fn test_aes_gcm() {
    let mut testtokn = TestToken::initialized();
    let key = ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &aes_template(32)));
    let params = gcm_params(&[9u8; 12], b"header", 128);
    let data = b"authenticated message";

    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_GCM, &params);
    assert_eq!(rv, CKR_OK);
    let enc = testtokn.step_ok(SKS_CMD_ENCRYPT_ONESHOT, data);
    assert_eq!(enc.len(), data.len() + 16);

    let rv = testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_GCM, &params);
    assert_eq!(rv, CKR_OK);
    assert!(testtokn.step_ok(SKS_CMD_DECRYPT_UPDATE, &enc[..10]).is_empty());
    assert!(testtokn.step_ok(SKS_CMD_DECRYPT_UPDATE, &enc[10..]).is_empty());
    assert_eq!(testtokn.step_ok(SKS_CMD_DECRYPT_FINAL, &[]), data.to_vec());

    let mut tampered = enc.clone();
    tampered[0] ^= 1;
    let rv = testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_GCM, &params);
    assert_eq!(rv, CKR_OK);
    let reply = testtokn.step(SKS_CMD_DECRYPT_ONESHOT, &tampered, 64);
    assert_eq!(reply.rv, CKR_SIGNATURE_INVALID);

    /* only 96 bit IVs and full tags */
    let params = gcm_params(&[9u8; 16], b"", 128);
    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_GCM, &params);
    assert_eq!(rv, CKR_MECHANISM_PARAM_INVALID);
    let params = gcm_params(&[9u8; 12], b"", 96);
    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_AES_GCM, &params);
    assert_eq!(rv, CKR_MECHANISM_PARAM_INVALID);
}

#[test]
#[parallel]
fn test_aes_cmac_known_answer() {
    let mut testtokn = TestToken::initialized();
    let value = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
    let key = import_aes(&mut testtokn, &value, true);

    let rv = testtokn.processing_init(SKS_CMD_SIGN_INIT, key, CKM_AES_CMAC, &[]);
    assert_eq!(rv, CKR_OK);
    let mac = testtokn.step_ok(SKS_CMD_SIGN_ONESHOT, &[]);
    assert_eq!(hex::encode(&mac), "bb1d6929e95937287fa37d129b756746");

    /* the general variant truncates */
    let params = ctrl(&[8], &[]);
    let rv = testtokn.processing_init(
        SKS_CMD_VERIFY_INIT,
        key,
        CKM_AES_CMAC_GENERAL,
        &params,
    );
    assert_eq!(rv, CKR_OK);
    assert_eq!(
        testtokn.verify_step(SKS_CMD_VERIFY_ONESHOT, &[], &mac[..8]),
        CKR_OK
    );
}

#[test]
#[parallel]
fn test_hmac() {
    let mut testtokn = TestToken::initialized();
    let template = make_template!(
        (u32, CKA_VALUE_LEN, 256),
        (bool, CKA_SIGN, true),
        (bool, CKA_VERIFY, true),
    );
    let key = ret_or_panic!(
        testtokn.generate_key(CKM_GENERIC_SECRET_KEY_GEN, &template)
    );
    assert_eq!(
        testtokn.get_attr_u32(key, CKA_KEY_TYPE),
        Ok(CKK_GENERIC_SECRET)
    );
    let data = b"message to authenticate";

    let rv = testtokn.processing_init(SKS_CMD_SIGN_INIT, key, CKM_SHA256_HMAC, &[]);
    assert_eq!(rv, CKR_OK);
    let mac = testtokn.step_ok(SKS_CMD_SIGN_ONESHOT, data);
    assert_eq!(mac.len(), 32);

    let rv = testtokn.processing_init(SKS_CMD_SIGN_INIT, key, CKM_SHA256_HMAC, &[]);
    assert_eq!(rv, CKR_OK);
    testtokn.step_ok(SKS_CMD_SIGN_UPDATE, &data[..5]);
    testtokn.step_ok(SKS_CMD_SIGN_UPDATE, &data[5..]);
    assert_eq!(testtokn.step_ok(SKS_CMD_SIGN_FINAL, &[]), mac);

    let rv = testtokn.processing_init(SKS_CMD_VERIFY_INIT, key, CKM_SHA256_HMAC, &[]);
    assert_eq!(rv, CKR_OK);
    assert_eq!(
        testtokn.verify_step(SKS_CMD_VERIFY_ONESHOT, data, &mac),
        CKR_OK
    );

    let rv = testtokn.processing_init(SKS_CMD_VERIFY_INIT, key, CKM_SHA256_HMAC, &[]);
    assert_eq!(rv, CKR_OK);
    assert_eq!(testtokn.verify_update(data), CKR_OK);
    assert_eq!(
        testtokn.verify_step(SKS_CMD_VERIFY_FINAL, &[], &mac),
        CKR_OK
    );

    let mut bad = mac.clone();
    bad[31] ^= 0x80;
    let rv = testtokn.processing_init(SKS_CMD_VERIFY_INIT, key, CKM_SHA256_HMAC, &[]);
    assert_eq!(rv, CKR_OK);
    assert_eq!(
        testtokn.verify_step(SKS_CMD_VERIFY_ONESHOT, data, &bad),
        CKR_SIGNATURE_INVALID
    );
}

#[test]
#[parallel]
fn test_key_usage() {
    let mut testtokn = TestToken::initialized();
    let template = make_template!(
        (u32, CKA_VALUE_LEN, 16),
        (bool, CKA_ENCRYPT, true),
    );
    let key = ret_or_panic!(testtokn.generate_key(CKM_AES_KEY_GEN, &template));

    let rv = testtokn.processing_init(SKS_CMD_DECRYPT_INIT, key, CKM_AES_ECB, &[]);
    assert_eq!(rv, CKR_KEY_FUNCTION_NOT_PERMITTED);
    let rv = testtokn.processing_init(SKS_CMD_SIGN_INIT, key, CKM_AES_CMAC, &[]);
    assert_eq!(rv, CKR_KEY_FUNCTION_NOT_PERMITTED);

    /* the mechanism must match the key type */
    let rv = testtokn.processing_init(
        SKS_CMD_ENCRYPT_INIT,
        key,
        CKM_RSA_PKCS,
        &[],
    );
    assert_eq!(rv, CKR_KEY_FUNCTION_NOT_PERMITTED);
    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key, CKM_SHA256, &[]);
    assert_eq!(rv, CKR_MECHANISM_INVALID);
    let rv = testtokn.processing_init(SKS_CMD_ENCRYPT_INIT, key + 100, CKM_AES_ECB, &[]);
    assert_eq!(rv, CKR_KEY_HANDLE_INVALID);

    /* a key size AES does not have */
    let template = make_template!((u32, CKA_VALUE_LEN, 20));
    assert_eq!(
        testtokn.generate_key(CKM_AES_KEY_GEN, &template),
        Err(CKR_KEY_SIZE_RANGE)
    );
}
