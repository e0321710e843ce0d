use adk_stream::utils::device;

fn main() -> anyhow::Result<()> {
    let inputs = device::get_available_inputs()?;
    println!("Available inputs: {}", inputs);

    let outputs = device::get_available_outputs()?;
    println!("Available outputs: {}", outputs);
    Ok(())
}
