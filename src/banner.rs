// src/banner.rs

/// Prints the application startup banner to the console.
pub fn print_banner() {
    let banner = r#"
 _ _                                                        
| | |_ __ ___         ___ ___  _ __ ___  _ __   __ _ _ __ ___ 
| | | '_ ` _ \ _____ / __/ _ \| '_ ` _ \| '_ \ / _` | '__/ _ \
| | | | | | | |_____| (_| (_) | | | | | | |_) | (_| | | |  __/
|_|_|_| |_| |_|      \___\___/|_| |_| |_| .__/ \__,_|_|  \___|
                                        |_|                   

    One prompt, every model, side by side
"#;
    println!("{}", banner);
}
