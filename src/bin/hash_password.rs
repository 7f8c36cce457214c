#![cfg(not(tarpaulin_include))]

use service_dashboard::login::hash_password;
use std::io::{self, BufRead};

/// Prints an Argon2 hash for each password given as an argument, or for each
/// line on stdin when there are none. Paste the output into the `Password` or
/// `owner_password` column and run the server with `CREDENTIALS_MODE=argon2`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() {
        for line in io::stdin().lock().lines() {
            let line = line?;
            if !line.trim().is_empty() {
                println!("{}", hash_password(line.trim())?);
            }
        }
    } else {
        for password in args {
            println!("{}", hash_password(&password)?);
        }
    }

    Ok(())
}
