use std::{error::Error, fs, path::PathBuf, process::ExitCode};

use clap::{arg, value_parser, Command};
use pretty_hex::pretty_hex;
use tspverify::{
    algorithm::Algorithm,
    utils::{to_hex_str, IndentString},
    ReplyParser, TsReply,
};

fn cli() -> Command {
    Command::new("tspverify")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Decode and verify RFC 3161 time-stamp replies")
        .arg(arg!(<REPLY> "DER encoded TimeStampResp file").value_parser(value_parser!(PathBuf)))
        .arg(
            arg!(-p --payload <FILE> "Check that the reply stamps this file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(--strict "Fail when the signing certificate hash matches no certificate"))
        .arg(
            arg!(--"min-digest" <ALG> "Reject imprints weaker than this digest")
                .value_parser(["sha1", "sha224", "sha256", "sha384", "sha512"]),
        )
        .arg(arg!(-d --dump "Hex dump the signed attributes and the signature"))
        .arg(arg!(-v --verbose ... "Increase logging, repeat for more"))
}

fn digest_by_name(name: &str) -> Algorithm {
    match name {
        "sha1" => Algorithm::Sha1,
        "sha224" => Algorithm::Sha224,
        "sha384" => Algorithm::Sha384,
        "sha512" => Algorithm::Sha512,
        _ => Algorithm::Sha256,
    }
}

fn print_reply(reply: &TsReply, dump: bool) {
    println!("Status: {}", reply.status);

    if let Some(tst_info) = &reply.tst_info {
        println!("Time-Stamp Token:");
        let mut lines = vec![
            format!("Policy: {}", tst_info.policy),
            format!("Serial Number: {}", tst_info.serial_number),
            format!("Time: {}", tst_info.signed_time),
            format!(
                "Message Imprint: {} {}",
                tst_info.digest_algorithm,
                to_hex_str(tst_info.payload_digest)
            ),
            format!("Ordering: {}", tst_info.ordering),
        ];
        if let Some(accuracy) = &tst_info.accuracy {
            lines.push(format!("Accuracy: {}", accuracy));
        }
        if let Some(nonce) = &tst_info.nonce {
            lines.push(format!("Nonce: {}", to_hex_str(nonce)));
        }
        if let Some(tsa) = &tst_info.tsa_name {
            lines.push(format!("TSA: {}", tsa));
        }
        println!("{}", lines.join("\n").indent(4));
    }

    if let Some(signer_info) = &reply.signer_info {
        println!("Signer:");
        let matched = match reply.signing_certificate_matched {
            Some(true) => "matched",
            Some(false) => "not found, first certificate used",
            None => "not named",
        };
        println!(
            "{}",
            format!(
                "Identity: {}\nDigest Algorithm: {}\nSignature Algorithm: {}\nSigning Certificate: {}",
                signer_info.signer_identity,
                signer_info.digest_algorithm,
                signer_info.signature_algorithm,
                matched
            )
            .indent(4)
        );

        if dump {
            if let Some(raw) = signer_info.signed_attributes_raw {
                println!("Signed Attributes:\n{}", pretty_hex(&raw).indent(4));
            }
            println!("Signature:\n{}", pretty_hex(&signer_info.signature).indent(4));
        }
    }

    for cert in reply.certificate_chain.iter() {
        print!("{}", cert);
    }
}

fn run() -> Result<ExitCode, Box<dyn Error>> {
    let matches = cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let path = matches
        .get_one::<PathBuf>("REPLY")
        .ok_or("missing reply file")?;
    let buf = fs::read(path)?;

    let mut parser = ReplyParser::new();
    parser.set_strict_signer_match(matches.get_flag("strict"));
    if let Some(name) = matches.get_one::<String>("min-digest") {
        parser.set_minimum_digest(digest_by_name(name));
    }

    let reply = parser.parse(&buf)?;
    print_reply(&reply, matches.get_flag("dump"));

    if !reply.is_granted() {
        return Ok(ExitCode::from(2));
    }

    if let Some(payload_path) = matches.get_one::<PathBuf>("payload") {
        let payload = fs::read(payload_path)?;
        reply.verify_payload(&payload)?;
        println!("Payload {} matches the message imprint", payload_path.display());
    }

    println!("Verification: OK");
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Verification failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
