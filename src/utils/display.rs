use colored::*;

pub fn print_banner(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "-".repeat(text.len()).bright_cyan());
}

pub fn print_bot(text: &str) {
    println!("{} {}\n", "bot:".green().bold(), text);
}

pub fn print_system(text: &str) {
    println!("{}", text.blue());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
}
